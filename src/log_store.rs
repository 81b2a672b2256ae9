use serde::{Deserialize, Serialize};

/// A single entry in the replicated log.
///
/// Index 0 is always a sentinel: `command` is `None`, and (index, term) carry
/// the last-included (index, term) of whatever snapshot the log prefix has
/// been truncated through. Real entries always carry `Some(command)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry<C> {
    pub index: u64,
    pub term: u64,
    pub command: Option<C>,
}

impl<C> LogEntry<C> {
    fn sentinel(index: u64, term: u64) -> Self {
        LogEntry { index, term, command: None }
    }
}

/// In-memory ordered sequence of log entries, offset by a snapshot-truncated
/// prefix. `entries[0]` is always the sentinel; `entries[k].index == entries[0].index + k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log<C> {
    entries: Vec<LogEntry<C>>,
}

impl<C: Clone> Log<C> {
    pub fn new() -> Self {
        Log { entries: vec![LogEntry::sentinel(0, 0)] }
    }

    /// lastIncludedIndex: the index carried by the sentinel.
    pub fn base_index(&self) -> u64 {
        self.entries[0].index
    }

    pub fn base_term(&self) -> u64 {
        self.entries[0].term
    }

    fn offset(&self, index: u64) -> Option<usize> {
        let base = self.base_index();
        if index < base {
            return None;
        }
        let off = (index - base) as usize;
        if off >= self.entries.len() {
            None
        } else {
            Some(off)
        }
    }

    pub fn last_index(&self) -> u64 {
        self.entries.last().expect("log always has a sentinel").index
    }

    pub fn last_term(&self) -> u64 {
        self.entries.last().expect("log always has a sentinel").term
    }

    pub fn term_at(&self, index: u64) -> Option<u64> {
        self.offset(index).map(|off| self.entries[off].term)
    }

    pub fn entry_at(&self, index: u64) -> Option<&LogEntry<C>> {
        self.offset(index).map(|off| &self.entries[off])
    }

    /// All entries strictly after `index`, cloned for sending over a batch RPC.
    pub fn entries_after(&self, index: u64) -> Vec<LogEntry<C>> {
        match self.offset(index) {
            Some(off) => self.entries[off + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Appends `entries` to the log. Only valid when the first new entry's
    /// index is exactly `last_index() + 1`; callers are expected to have
    /// already truncated any conflicting suffix first.
    pub fn append(&mut self, entries: Vec<LogEntry<C>>) {
        if let Some(first) = entries.first() {
            debug_assert_eq!(
                first.index,
                self.last_index() + 1,
                "append must be contiguous with the existing log"
            );
        }
        self.entries.extend(entries);
    }

    /// Drops every entry with index >= `index`, keeping the log a prefix of
    /// what it was.
    pub fn truncate_suffix_from(&mut self, index: u64) {
        if let Some(off) = self.offset(index) {
            self.entries.truncate(off);
        }
    }

    /// Rebuilds the log as [sentinel(last_included_index, last_included_term),
    /// ...entries that previously existed past that point]. If no existing
    /// entry matches (last_included_index, last_included_term), the result is
    /// just the new sentinel (the follower is far enough behind that nothing
    /// of the old log survives).
    pub fn truncate_prefix_through(&mut self, last_included_index: u64, last_included_term: u64) {
        let tail = self
            .offset(last_included_index)
            .filter(|&off| self.entries[off].term == last_included_term)
            .map(|off| self.entries[off + 1..].to_vec());

        let mut new_entries = vec![LogEntry::sentinel(last_included_index, last_included_term)];
        if let Some(tail) = tail {
            new_entries.extend(tail);
        }
        self.entries = new_entries;
    }

    /// Scans backward from `conflict_index - 1` for the first entry whose
    /// term differs from the term at `conflict_index`, returning the index
    /// one past it. Used by the AppendEntries conflict-optimization reply.
    pub fn first_index_of_conflicting_term(&self, conflict_index: u64) -> u64 {
        let conflict_term = match self.term_at(conflict_index) {
            Some(t) => t,
            None => return self.base_index() + 1,
        };
        let mut i = conflict_index;
        while i > self.base_index() {
            match self.term_at(i - 1) {
                Some(t) if t != conflict_term => break,
                Some(_) => i -= 1,
                None => break,
            }
        }
        i
    }
}
