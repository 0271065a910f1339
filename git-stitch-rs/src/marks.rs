use crate::command::{markref_bytes, parse_markref, Command};

/// Highest mark number declared anywhere in the sequence.
pub fn max_mark(cmds: &[Command]) -> u32 {
    cmds.iter()
        .filter_map(|cmd| match cmd {
            Command::Mark(n) => Some(*n),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

/// Add `offset` to every mark in the sequence: `mark` declarations, `from`
/// and `merge` references, the dataref of `M` when it is a mark, and both
/// operands of `N`. Hex object ids and `inline` datarefs pass through
/// untouched, so two renumbered streams can share one mark space.
pub fn renumber(cmds: &mut [Command], offset: u32) {
    if offset == 0 {
        return;
    }
    for cmd in cmds.iter_mut() {
        match cmd {
            Command::Mark(n) => *n = n.saturating_add(offset),
            Command::From(target) | Command::Merge(target) => shift(target, offset),
            Command::FileModify { dataref, .. } => shift(dataref, offset),
            Command::Note { dataref, commitref } => {
                shift(dataref, offset);
                shift(commitref, offset);
            }
            _ => {}
        }
    }
}

fn shift(target: &mut Vec<u8>, offset: u32) {
    if let Some(mark) = parse_markref(target) {
        *target = markref_bytes(mark.saturating_add(offset));
    }
}
