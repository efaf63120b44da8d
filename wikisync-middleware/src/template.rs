//! Tera rendering of page content.
//!
//! The unit's content is treated as a template. Available variables:
//!
//! | Variable                 | Value                                   |
//! |--------------------------|-----------------------------------------|
//! | `unit.target_id`         | current page identifier                 |
//! | `unit.original_path`     | source file path                        |
//! | `unit.short_extension`   | e.g. `.lua`                             |
//! | `unit.long_extension`    | e.g. `.client.lua`                      |
//! | `unit.commit_message`    | current edit summary                    |
//! | `settings`               | the step's settings, or `null`          |

use serde::Serialize;
use tera::{Context, Tera};

use wikisync_core::ContentUnit;

use crate::error::StepError;
use crate::step::Settings;

/// Serializable rendering payload.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext<'a> {
    pub unit: UnitCtx<'a>,
    pub settings: Option<&'a Settings>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitCtx<'a> {
    pub target_id: &'a str,
    pub original_path: String,
    pub short_extension: &'a str,
    pub long_extension: &'a str,
    pub commit_message: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn new(unit: &'a ContentUnit, settings: Option<&'a Settings>) -> Self {
        Self {
            unit: UnitCtx {
                target_id: &unit.target_id,
                original_path: unit.original_path().display().to_string(),
                short_extension: unit.short_extension(),
                long_extension: unit.long_extension(),
                commit_message: &unit.commit_message,
            },
            settings,
        }
    }

    pub fn to_tera(&self) -> Result<Context, StepError> {
        Ok(Context::from_serialize(self)?)
    }
}

/// Render `unit.content` as a one-off template.
pub fn render(unit: &ContentUnit, settings: Option<&Settings>) -> Result<String, StepError> {
    let context = TemplateContext::new(unit, settings).to_tera()?;
    Ok(Tera::one_off(&unit.content, &context, false)?)
}
