//! `COMMAND_USAGE`: base command, command length and a teleport flag.

use super::CONTEXT_COLUMN;
use crate::error::FeaturePolicyError;
use crate::normalize::NestedColumn;
use crate::policy::{EventPipeline, FeaturePolicy};
use crate::report::{ChartKind, ChartSpec};
use crate::table::Table;
use crate::value::Value;

/// Commands that move the player.
pub const TELEPORT_COMMANDS: [&str; 7] = ["/home", "/warp", "/tpa", "/tpaccept", "/back", "/spawn", "/rtp"];

pub struct CommandsPolicy;

impl FeaturePolicy for CommandsPolicy {
    fn engineer(&self, mut table: Table) -> Result<Table, FeaturePolicyError> {
        if !table.has_column("command") {
            return Ok(table);
        }
        table.derive_column("base_command", |r| match r.get_or_null("command") {
            Value::Null => Value::Null,
            v => Value::from(v.render().split(' ').next().unwrap_or_default()),
        });
        table.derive_column("cmd_length", |r| match r.get_or_null("command") {
            Value::Null => Value::Null,
            v => Value::from(v.render().chars().count()),
        });
        table.derive_column("is_teleport", |r| match r.get_or_null("base_command") {
            Value::Str(base) => Value::Bool(TELEPORT_COMMANDS.contains(&base.as_str())),
            _ => Value::Null,
        });
        Ok(table)
    }
}

#[must_use]
pub fn pipeline() -> EventPipeline {
    EventPipeline::new("commands", "COMMAND_USAGE")
        .nested(NestedColumn::flatten(CONTEXT_COLUMN))
        .policy(CommandsPolicy)
        .chart(
            ChartSpec::new(
                "top_cmds",
                "Top Commands",
                ChartKind::HorizontalBar,
                ChartSpec::count_by("base_command", Some(10)),
            )
            .labels("count", "base_command"),
        )
}
