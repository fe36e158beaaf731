// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FlowbuildError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowbuildError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.build, raw.rule))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_rules(cfg)?;
    validate_build_section(cfg)?;
    validate_rules(cfg)?;
    Ok(())
}

fn ensure_has_rules(cfg: &RawConfigFile) -> Result<()> {
    if cfg.rule.is_empty() {
        return Err(FlowbuildError::Config(
            "config must contain at least one [[rule]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_build_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.build.max_concurrent == 0 {
        return Err(FlowbuildError::Config(
            "[build].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_rules(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();

    for rule in &cfg.rule {
        if rule.name.is_empty() {
            return Err(FlowbuildError::Config(
                "rule name must not be empty".to_string(),
            ));
        }
        if !seen.insert(rule.name.as_str()) {
            return Err(FlowbuildError::Config(format!(
                "duplicate rule name '{}'",
                rule.name
            )));
        }
        if rule.script.is_empty() {
            return Err(FlowbuildError::Config(format!(
                "rule '{}' has an empty script path",
                rule.name
            )));
        }
        if !rule.match_suffix.starts_with('.') {
            return Err(FlowbuildError::Config(format!(
                "rule '{}': match suffix '{}' must start with '.'",
                rule.name, rule.match_suffix
            )));
        }
        for trigger in &rule.triggers {
            if !trigger.contains(':') {
                return Err(FlowbuildError::Config(format!(
                    "rule '{}': trigger '{}' is not of the form kind:name",
                    rule.name, trigger
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        raw.try_into()
    }

    #[test]
    fn minimal_config_validates() {
        let cfg = parse(
            r#"
            [[rule]]
            name = "protoc"
            script = "rules/protoc.sh"
            match = ".proto"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.build.max_concurrent, 4);
        assert_eq!(cfg.rule[0].verb, "build");
    }

    #[test]
    fn rejects_missing_rules() {
        assert!(parse("[build]\nmax_concurrent = 2\n").is_err());
    }

    #[test]
    fn rejects_zero_parallelism() {
        let err = parse(
            r#"
            [build]
            max_concurrent = 0

            [[rule]]
            name = "a"
            script = "a.sh"
            match = ".a"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let err = parse(
            r#"
            [[rule]]
            name = "a"
            script = "a.sh"
            match = ".a"

            [[rule]]
            name = "a"
            script = "b.sh"
            match = ".b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate rule name"));
    }

    #[test]
    fn rejects_bad_suffix_and_trigger() {
        assert!(parse(
            r#"
            [[rule]]
            name = "a"
            script = "a.sh"
            match = "proto"
            "#,
        )
        .is_err());

        assert!(parse(
            r#"
            [[rule]]
            name = "a"
            script = "a.sh"
            match = ".proto"
            triggers = ["nocolon"]
            "#,
        )
        .is_err());
    }
}
