// ABOUTME: Per-compilation table alias allocation
// ABOUTME: Hands out "{table}_{n}" so repeated and self-joined tables never collide

use std::collections::HashMap;

/// Allocates unique aliases for the tables of one compiled query.
///
/// Counters are per table name and start at 1. Create one per compile call;
/// every nested query of that call must draw from the same instance.
#[derive(Debug, Default)]
pub struct TableAliases {
    counters: HashMap<String, usize>,
}

impl TableAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_alias(&mut self, table: &str) -> String {
        let counter = self.counters.entry(table.to_string()).or_insert(0);
        *counter += 1;
        format!("{}_{}", table, counter)
    }
}
