//! Prompt variant lookup and rendering.
use crate::config::{EnrichConfig, CODES_PLACEHOLDER};
use anyhow::{anyhow, Result};

/// Template registered under `variant`.
pub fn prompt_template<'a>(config: &'a EnrichConfig, variant: &str) -> Result<&'a str> {
    config
        .prompts
        .get(variant)
        .map(String::as_str)
        .ok_or_else(|| {
            let known = config.prompts.keys().cloned().collect::<Vec<_>>();
            anyhow!("unknown prompt {variant:?} (known: {})", known.join(", "))
        })
}

/// Substitute the batch, comma separated, for `{codes}`.
pub fn render_prompt(template: &str, codes: &[String]) -> String {
    template.replace(CODES_PLACEHOLDER, &codes.join(", "))
}
