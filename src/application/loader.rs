//! # Loader
//!
//! Reads the bot configuration and the rule files from disk.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::application::substitution::expand_env;
use crate::domain::config::BotConfig;
use crate::domain::types::{Rule, RuleMap};

/// Load `bot.yml`, expanding `${ENV}` tokens first.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<BotConfig> {
    let (expanded, missing) = expand_env(raw);
    for name in missing {
        warn!("environment variable '{}' is not set - using an empty value", name);
    }
    Ok(serde_yaml::from_str(&expanded)?)
}

/// Load every `*.yml` / `*.yaml` rule file in `dir` (one rule per file).
pub fn load_rules(dir: &Path) -> Result<RuleMap> {
    let mut rules = RuleMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read rules dir {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    for path in paths {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rule: Rule = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse rule {}", path.display()))?;
        validate_rule(&rule).with_context(|| format!("Invalid rule {}", path.display()))?;
        if rules.contains_key(&rule.name) {
            bail!("Duplicate rule name '{}' in {}", rule.name, path.display());
        }
        debug!("loaded rule '{}'", rule.name);
        rules.insert(rule.name.clone(), rule);
    }
    Ok(rules)
}

fn validate_rule(rule: &Rule) -> Result<()> {
    if rule.name.trim().is_empty() {
        bail!("Rule has no name");
    }
    if let Some(hear) = &rule.hear {
        Regex::new(hear).with_context(|| format!("Bad 'hear' pattern for rule '{}'", rule.name))?;
    }
    for action in &rule.actions {
        if action.cmd.trim().is_empty() {
            bail!("Rule '{}' has an action without a command", rule.name);
        }
    }
    Ok(())
}
