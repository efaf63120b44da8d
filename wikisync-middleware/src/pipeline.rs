//! Runs a unit through the configured steps, in declaration order.
//!
//! A failing step is recorded on the unit (which then stops being persisted)
//! and reported through the `on_error` observer; later steps still run.

use wikisync_core::{ContentUnit, UnitError};

use crate::step::{MatchMode, PipelineStep, SettingsTable};

/// Apply `steps` to `unit` in place.
pub fn run<F>(
    unit: &mut ContentUnit,
    steps: &[PipelineStep],
    settings: &SettingsTable,
    mode: MatchMode,
    mut on_error: F,
) where
    F: FnMut(&ContentUnit, &UnitError),
{
    for step in steps {
        if !step.applies_to(unit, mode) {
            continue;
        }

        let step_settings = step
            .settings_index
            .as_ref()
            .and_then(|index| settings.get(index));

        if let Err(err) = step.execute(unit, step_settings) {
            let error = UnitError {
                step: step.name.clone(),
                message: err.full_message(),
            };
            tracing::warn!(
                step = %step.name,
                page = %unit.target_id,
                error = %error.message,
                "middleware step failed",
            );
            unit.record_error(error.clone());
            on_error(&*unit, &error);
        }
    }
}
