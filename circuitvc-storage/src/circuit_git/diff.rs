// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Diff Engine - Structural LCS Diff
//!
//! Aligns two parsed circuits operation by operation and reports the
//! minimal edit script as `kept` / `removed` / `inserted` segments.
//!
//! ## Algorithm
//!
//! 1. Strip the common prefix and suffix (usually most of a circuit).
//! 2. Align the rest with a longest-common-subsequence table while it fits
//!    in [`DiffConfig::max_table_cells`], otherwise with Hirschberg's
//!    linear-space divide and conquer, which falls back to the table once
//!    subproblems are small enough.
//! 3. Group the script into segments. Within every run of changes, removed
//!    operations come before inserted ones.
//!
//! Among equally long alignments both algorithms pick the one that removes
//! old operations as early as possible (the leftmost path through the edit
//! graph), so the table and Hirschberg produce identical segments.
//!
//! Line-level text diffs (for payloads that are not OpenQASM) use the
//! patience algorithm from `similar`.

use circuitvc_core::circuit::{parse_payload, Operation};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fmt;

/// Configuration for diff engine
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Largest LCS table (rows x columns) built in one piece
    pub max_table_cells: usize,
    /// Number of context lines around changes in unified text output
    pub context_lines: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_table_cells: 4_000_000,
            context_lines: 3,
        }
    }
}

/// Segment tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Kept,
    Removed,
    Inserted,
}

impl SegmentKind {
    fn marker(self) -> char {
        match self {
            SegmentKind::Kept => ' ',
            SegmentKind::Removed => '-',
            SegmentKind::Inserted => '+',
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::Kept => "kept",
            SegmentKind::Removed => "removed",
            SegmentKind::Inserted => "inserted",
        };
        f.write_str(name)
    }
}

/// A maximal run of operations with the same tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub kind: SegmentKind,
    /// Index of the segment's first position in the old sequence
    pub old_start: usize,
    /// Index of the segment's first position in the new sequence
    pub new_start: usize,
    pub operations: Vec<Operation>,
}

/// Diff statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub kept: usize,
    pub removed: usize,
    pub inserted: usize,
}

impl DiffStats {
    /// Net operations changed
    pub fn net_change(&self) -> i64 {
        self.inserted as i64 - self.removed as i64
    }
}

/// Structural diff of two circuits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitDiff {
    pub segments: Vec<DiffSegment>,
}

impl CircuitDiff {
    /// True when nothing was inserted or removed
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.kind == SegmentKind::Kept)
    }

    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for segment in &self.segments {
            let count = segment.operations.len();
            match segment.kind {
                SegmentKind::Kept => stats.kept += count,
                SegmentKind::Removed => stats.removed += count,
                SegmentKind::Inserted => stats.inserted += count,
            }
        }
        stats
    }

    /// The old sequence, rebuilt from kept and removed segments
    pub fn old_operations(&self) -> Vec<Operation> {
        self.collect(SegmentKind::Removed)
    }

    /// The new sequence, rebuilt from kept and inserted segments
    pub fn new_operations(&self) -> Vec<Operation> {
        self.collect(SegmentKind::Inserted)
    }

    fn collect(&self, side: SegmentKind) -> Vec<Operation> {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Kept || s.kind == side)
            .flat_map(|s| s.operations.iter().cloned())
            .collect()
    }

    /// One line per operation, prefixed with ` `, `-` or `+`
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        for segment in &self.segments {
            for op in &segment.operations {
                output.push(segment.kind.marker());
                output.push(' ');
                output.push_str(&op.to_string());
                output.push('\n');
            }
        }
        output
    }
}

/// One step of an edit script, with absolute indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep(usize),
    Remove(usize),
    Insert(usize),
}

/// Structural diff engine
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    /// Create a new diff engine with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: DiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Parse both payloads and diff the resulting operation sequences
    pub fn diff_payloads(&self, old: &[u8], new: &[u8]) -> CircuitDiff {
        self.diff_operations(&parse_payload(old), &parse_payload(new))
    }

    /// Diff two operation sequences
    pub fn diff_operations(&self, old: &[Operation], new: &[Operation]) -> CircuitDiff {
        let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let old_mid = &old[prefix..old.len() - suffix];
        let new_mid = &new[prefix..new.len() - suffix];

        let mut edits = Vec::with_capacity(old.len() + new.len());
        edits.extend((0..prefix).map(Edit::Keep));
        align(
            old_mid,
            new_mid,
            prefix,
            prefix,
            self.config.max_table_cells,
            &mut edits,
        );
        edits.extend((old.len() - suffix..old.len()).map(Edit::Keep));

        CircuitDiff {
            segments: group(old, new, &edits),
        }
    }

    /// Line-level unified diff of two payloads (lossy UTF-8)
    pub fn unified_text(&self, old: &[u8], new: &[u8], old_label: &str, new_label: &str) -> String {
        let old_text = String::from_utf8_lossy(old);
        let new_text = String::from_utf8_lossy(new);
        let diff = TextDiff::configure()
            .algorithm(similar::Algorithm::Patience)
            .diff_lines(&*old_text, &*new_text);

        let unchanged = diff
            .iter_all_changes()
            .all(|change| change.tag() == ChangeTag::Equal);
        if unchanged {
            return String::new();
        }

        diff.unified_diff()
            .context_radius(self.config.context_lines)
            .header(old_label, new_label)
            .to_string()
    }
}

/// Append the edit script for `a` -> `b`. `ao`/`bo` are the absolute
/// offsets of the slices in the full sequences.
fn align(
    a: &[Operation],
    b: &[Operation],
    ao: usize,
    bo: usize,
    max_cells: usize,
    out: &mut Vec<Edit>,
) {
    if a.len().saturating_mul(b.len()) <= max_cells {
        table_script(a, b, ao, bo, out);
    } else {
        hirschberg(a, b, ao, bo, max_cells, out);
    }
}

/// Classic O(n*m) suffix-LCS table, walked front to back. At each cell the
/// walk removes if that keeps the alignment optimal, else keeps a match,
/// else inserts.
fn table_script(a: &[Operation], b: &[Operation], ao: usize, bo: usize, out: &mut Vec<Edit>) {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if table[(i + 1) * width + j] == table[i * width + j] {
            out.push(Edit::Remove(ao + i));
            i += 1;
        } else if a[i] == b[j] {
            out.push(Edit::Keep(ao + i));
            i += 1;
            j += 1;
        } else {
            out.push(Edit::Insert(bo + j));
            j += 1;
        }
    }
    out.extend((i..n).map(|i| Edit::Remove(ao + i)));
    out.extend((j..m).map(|j| Edit::Insert(bo + j)));
}

/// Hirschberg's linear-space LCS: split `a` in half, find where the leftmost
/// optimal path enters the middle row, recurse on both quadrants.
fn hirschberg(
    a: &[Operation],
    b: &[Operation],
    ao: usize,
    bo: usize,
    max_cells: usize,
    out: &mut Vec<Edit>,
) {
    if a.is_empty() || b.is_empty() {
        table_script(a, b, ao, bo, out);
        return;
    }

    if a.len() == 1 {
        match b.iter().position(|op| *op == a[0]) {
            Some(j) => {
                out.extend((0..j).map(|k| Edit::Insert(bo + k)));
                out.push(Edit::Keep(ao));
                out.extend((j + 1..b.len()).map(|k| Edit::Insert(bo + k)));
            }
            None => {
                out.push(Edit::Remove(ao));
                out.extend((0..b.len()).map(|k| Edit::Insert(bo + k)));
            }
        }
        return;
    }

    let mid = a.len() / 2;
    let forward = lcs_prefix_row(&a[..mid], b);
    let backward = lcs_suffix_row(&a[mid..], b);

    // First column with the best total: the leftmost optimal crossing
    let mut split = 0;
    let mut best = 0;
    for j in 0..=b.len() {
        let total = forward[j] + backward[j];
        if total > best {
            best = total;
            split = j;
        }
    }

    align(&a[..mid], &b[..split], ao, bo, max_cells, out);
    align(&a[mid..], &b[split..], ao + mid, bo + split, max_cells, out);
}

/// `row[j]` = LCS length of `a` and `b[..j]`
fn lcs_prefix_row(a: &[Operation], b: &[Operation]) -> Vec<u32> {
    let m = b.len();
    let mut prev = vec![0u32; m + 1];
    let mut cur = vec![0u32; m + 1];
    for x in a {
        cur[0] = 0;
        for j in 1..=m {
            cur[j] = if *x == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(cur[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

/// `row[j]` = LCS length of `a` and `b[j..]`
fn lcs_suffix_row(a: &[Operation], b: &[Operation]) -> Vec<u32> {
    let m = b.len();
    let mut prev = vec![0u32; m + 1];
    let mut cur = vec![0u32; m + 1];
    for x in a.iter().rev() {
        cur[m] = 0;
        for j in (0..m).rev() {
            cur[j] = if *x == b[j] {
                prev[j + 1] + 1
            } else {
                prev[j].max(cur[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

/// Collapse an edit script into segments, removed before inserted.
fn group(old: &[Operation], new: &[Operation], edits: &[Edit]) -> Vec<DiffSegment> {
    let mut segments = Vec::new();
    let mut kept = Vec::new();
    let mut removed = Vec::new();
    let mut inserted = Vec::new();
    let (mut old_pos, mut new_pos) = (0usize, 0usize);

    let mut flush = |segments: &mut Vec<DiffSegment>,
                     kind: SegmentKind,
                     ops: &mut Vec<Operation>| {
        if ops.is_empty() {
            return;
        }
        let len = ops.len();
        segments.push(DiffSegment {
            kind,
            old_start: old_pos,
            new_start: new_pos,
            operations: std::mem::take(ops),
        });
        match kind {
            SegmentKind::Kept => {
                old_pos += len;
                new_pos += len;
            }
            SegmentKind::Removed => old_pos += len,
            SegmentKind::Inserted => new_pos += len,
        }
    };

    for edit in edits {
        match *edit {
            Edit::Keep(i) => {
                flush(&mut segments, SegmentKind::Removed, &mut removed);
                flush(&mut segments, SegmentKind::Inserted, &mut inserted);
                kept.push(old[i].clone());
            }
            Edit::Remove(i) => {
                flush(&mut segments, SegmentKind::Kept, &mut kept);
                removed.push(old[i].clone());
            }
            Edit::Insert(j) => {
                flush(&mut segments, SegmentKind::Kept, &mut kept);
                inserted.push(new[j].clone());
            }
        }
    }
    flush(&mut segments, SegmentKind::Kept, &mut kept);
    flush(&mut segments, SegmentKind::Removed, &mut removed);
    flush(&mut segments, SegmentKind::Inserted, &mut inserted);

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuitvc_core::circuit::{parse_circuit, Operand};
    use proptest::prelude::*;

    fn gate(name: &str, index: u32) -> Operation {
        Operation::gate(name, vec![Operand::new("q", Some(index))])
    }

    fn kinds(diff: &CircuitDiff) -> Vec<SegmentKind> {
        diff.segments.iter().map(|s| s.kind).collect()
    }

    fn hirschberg_only() -> DiffEngine {
        DiffEngine::with_config(DiffConfig {
            max_table_cells: 0,
            ..DiffConfig::default()
        })
    }

    /// Small alphabet so sequences share plenty of operations
    fn ops_from(codes: &[u8]) -> Vec<Operation> {
        codes
            .iter()
            .map(|c| gate(["h", "x", "cx"][(*c % 3) as usize], u32::from(*c % 2)))
            .collect()
    }

    #[test]
    fn test_appended_measurement() {
        let engine = DiffEngine::new();
        let diff = engine.diff_payloads(
            b"h q[0]; cx q[0],q[1];",
            b"h q[0]; cx q[0],q[1]; measure q->c;",
        );

        assert_eq!(kinds(&diff), vec![SegmentKind::Kept, SegmentKind::Inserted]);
        assert_eq!(diff.segments[0].operations.len(), 2);
        assert_eq!(diff.segments[1].operations[0].gate_name(), Some("measure"));
        assert_eq!(diff.segments[1].old_start, 2);
        assert_eq!(diff.segments[1].new_start, 2);
    }

    #[test]
    fn test_identical_is_single_kept_segment() {
        let ops = parse_circuit("h q[0]; cx q[0], q[1]; measure q -> c;");
        let diff = DiffEngine::new().diff_operations(&ops, &ops);

        assert_eq!(kinds(&diff), vec![SegmentKind::Kept]);
        assert!(diff.is_empty());
        assert_eq!(diff.stats().kept, 3);
    }

    #[test]
    fn test_empty_inputs() {
        let engine = DiffEngine::new();
        let ops = ops_from(&[0, 1, 2]);

        assert!(engine.diff_operations(&[], &[]).segments.is_empty());

        let added = engine.diff_operations(&[], &ops);
        assert_eq!(kinds(&added), vec![SegmentKind::Inserted]);

        let dropped = engine.diff_operations(&ops, &[]);
        assert_eq!(kinds(&dropped), vec![SegmentKind::Removed]);
    }

    #[test]
    fn test_replacement_removes_before_inserting() {
        let old = vec![gate("h", 0), gate("x", 0), gate("cx", 1)];
        let new = vec![gate("h", 0), gate("z", 0), gate("cx", 1)];

        let diff = DiffEngine::new().diff_operations(&old, &new);
        assert_eq!(
            kinds(&diff),
            vec![
                SegmentKind::Kept,
                SegmentKind::Removed,
                SegmentKind::Inserted,
                SegmentKind::Kept
            ]
        );
        assert_eq!(diff.stats(), DiffStats { kept: 2, removed: 1, inserted: 1 });
        assert_eq!(diff.stats().net_change(), 0);
    }

    #[test]
    fn test_register_change_is_visible() {
        let diff = DiffEngine::new().diff_payloads(
            b"OPENQASM 2.0; qreg q[2]; h q[0];",
            b"OPENQASM 2.0; qreg q[3]; h q[0];",
        );
        assert_eq!(diff.stats().removed, 1);
        assert_eq!(diff.stats().inserted, 1);
        assert!(diff.segments[1].operations[0].is_declaration());
    }

    #[test]
    fn test_whitespace_only_change_is_empty() {
        let diff = DiffEngine::new().diff_payloads(b"cx q[0],q[1];", b"cx q[0], q[1];\n");
        assert!(diff.is_empty());
    }

    #[test]
    fn test_to_text_markers() {
        let old = vec![gate("h", 0), gate("x", 1)];
        let new = vec![gate("h", 0), gate("y", 1)];
        let text = DiffEngine::new().diff_operations(&old, &new).to_text();
        assert_eq!(text, "  h q[0]\n- x q[1]\n+ y q[1]\n");
    }

    #[test]
    fn test_hirschberg_matches_table_on_example() {
        let old = ops_from(&[0, 1, 2, 3, 4, 5, 0, 1]);
        let new = ops_from(&[1, 2, 2, 5, 4, 0, 3, 1, 0]);

        let table = DiffEngine::new().diff_operations(&old, &new);
        let linear = hirschberg_only().diff_operations(&old, &new);
        assert_eq!(table, linear);
    }

    #[test]
    fn test_duplicate_match_prefers_early_removal() {
        // Either `h` of the old side could be kept; the earlier one is removed
        let old = vec![gate("x", 0), gate("h", 0), gate("h", 0), gate("y", 0)];
        let new = vec![gate("z", 0), gate("h", 0), gate("w", 0)];

        for engine in [DiffEngine::new(), hirschberg_only()] {
            let diff = engine.diff_operations(&old, &new);
            assert_eq!(
                kinds(&diff),
                vec![
                    SegmentKind::Removed,
                    SegmentKind::Inserted,
                    SegmentKind::Kept,
                    SegmentKind::Removed,
                    SegmentKind::Inserted
                ]
            );
            assert_eq!(diff.segments[0].operations, vec![gate("x", 0), gate("h", 0)]);
            assert_eq!(diff.segments[2].old_start, 2);
            assert_eq!(diff.segments[2].new_start, 1);
        }
    }

    #[test]
    fn test_unified_text() {
        let engine = DiffEngine::new();
        let text = engine.unified_text(
            b"qc.h(0)\nqc.cx(0, 1)\n",
            b"qc.h(0)\nqc.cx(0, 1)\nqc.measure_all()\n",
            "a/bell.py",
            "b/bell.py",
        );
        assert!(text.starts_with("--- a/bell.py\n+++ b/bell.py\n"));
        assert!(text.contains("+qc.measure_all()"));

        assert!(engine.unified_text(b"same\n", b"same\n", "a", "b").is_empty());
    }

    proptest! {
        #[test]
        fn prop_self_diff_has_no_changes(codes in prop::collection::vec(0u8..6, 0..40)) {
            let ops = ops_from(&codes);
            let diff = DiffEngine::new().diff_operations(&ops, &ops);
            prop_assert!(diff.is_empty());
            prop_assert_eq!(diff.stats().kept, ops.len());
        }

        #[test]
        fn prop_script_rebuilds_both_sides(
            a in prop::collection::vec(0u8..6, 0..30),
            b in prop::collection::vec(0u8..6, 0..30),
        ) {
            let (old, new) = (ops_from(&a), ops_from(&b));
            for engine in [DiffEngine::new(), hirschberg_only()] {
                let diff = engine.diff_operations(&old, &new);
                prop_assert_eq!(diff.old_operations(), old.clone());
                prop_assert_eq!(diff.new_operations(), new.clone());
            }
        }

        #[test]
        fn prop_table_and_hirschberg_agree(
            a in prop::collection::vec(0u8..6, 0..30),
            b in prop::collection::vec(0u8..6, 0..30),
        ) {
            let (old, new) = (ops_from(&a), ops_from(&b));
            let table = DiffEngine::new().diff_operations(&old, &new);
            let linear = hirschberg_only().diff_operations(&old, &new);
            prop_assert_eq!(table, linear);
        }

        #[test]
        fn prop_changes_never_insert_before_remove(
            a in prop::collection::vec(0u8..6, 0..30),
            b in prop::collection::vec(0u8..6, 0..30),
        ) {
            let diff = DiffEngine::new().diff_operations(&ops_from(&a), &ops_from(&b));
            for pair in diff.segments.windows(2) {
                prop_assert!(!(pair[0].kind == SegmentKind::Inserted
                    && pair[1].kind == SegmentKind::Removed));
                prop_assert!(pair[0].kind != pair[1].kind);
            }
        }
    }
}
