//! Pattern registry
//!
//! An ordered table of labelled markers. Position in the table is priority:
//! when two markers match starting at the same stream offset, the one that was
//! registered first wins. The `eof` and `timeout` sentinels are not stored
//! here; the matcher reports them structurally and always ahead of any label.

use regex::bytes::Regex;
use std::fmt;

/// A compiled marker to look for in console output
#[derive(Clone)]
pub struct Marker {
    source: String,
    regex: Regex,
}

impl Marker {
    /// Compile a regular expression marker
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    /// Marker matching `text` literally
    pub fn literal(text: &str) -> Self {
        let regex = Regex::new(&regex::escape(text))
            .unwrap_or_else(|_| unreachable!("escaped literal is always a valid regex"));
        Self {
            source: text.to_string(),
            regex,
        }
    }

    /// Pattern text as configured
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compiled expression
    pub fn regex_ref(&self) -> &Regex {
        &self.regex
    }

    /// The expression declares a named group `name`
    pub fn has_group(&self, name: &str) -> bool {
        self.regex.capture_names().flatten().any(|n| n == name)
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Marker").field(&self.source).finish()
    }
}

/// One labelled marker in a [`PatternTable`]
#[derive(Debug, Clone)]
pub struct PatternEntry<L> {
    /// Label reported when this marker matches
    pub label: L,
    /// What to look for
    pub marker: Marker,
    /// Matching this entry ends the monitoring loop
    pub terminal: bool,
    /// Position in the table, lower wins ties
    pub priority: usize,
}

/// Ordered label → marker mapping built fresh for each invocation
#[derive(Debug, Clone)]
pub struct PatternTable<L> {
    entries: Vec<PatternEntry<L>>,
}

impl<L> Default for PatternTable<L> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<L> PatternTable<L>
where
    L: Copy + PartialEq + fmt::Debug,
{
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with the lowest priority so far.
    ///
    /// Labels must be unique; registering a label twice is a programming error
    /// and the second entry is ignored.
    #[must_use]
    pub fn with(mut self, label: L, marker: Marker, terminal: bool) -> Self {
        self.push(label, marker, terminal);
        self
    }

    /// Append an entry in place
    pub fn push(&mut self, label: L, marker: Marker, terminal: bool) {
        if self.entries.iter().any(|e| e.label == label) {
            tracing::warn!("Ignoring duplicate pattern label {:?}", label);
            return;
        }
        let priority = self.entries.len();
        self.entries.push(PatternEntry {
            label,
            marker,
            terminal,
            priority,
        });
    }

    /// Entries in priority order
    pub fn entries(&self) -> &[PatternEntry<L>] {
        &self.entries
    }

    /// Look up an entry by label
    pub fn get(&self, label: L) -> Option<&PatternEntry<L>> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Is `label` terminal in this table
    pub fn is_terminal(&self, label: L) -> bool {
        self.get(label).is_some_and(|e| e.terminal)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the earliest match in `haystack`.
    ///
    /// The entry whose match starts first wins; on a tie the entry with the
    /// lower priority number wins. Returns the entry and its captures.
    pub fn find<'h>(
        &self,
        haystack: &'h [u8],
    ) -> Option<(&PatternEntry<L>, regex::bytes::Captures<'h>)> {
        let mut best: Option<(&PatternEntry<L>, regex::bytes::Captures<'h>)> = None;

        for entry in &self.entries {
            let Some(caps) = entry.marker.regex.captures(haystack) else {
                continue;
            };
            let start = caps.get(0).map_or(usize::MAX, |m| m.start());
            let better = match &best {
                None => true,
                Some((_, current)) => {
                    // strict comparison keeps the earlier-registered entry on ties
                    start < current.get(0).map_or(usize::MAX, |m| m.start())
                }
            };
            if better {
                best = Some((entry, caps));
            }
        }

        best
    }
}
