#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStack<T> {
    entries: Vec<T>,
    cursor: Option<usize>,
}

impl<T> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HistoryStack<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
        }
    }

    pub fn append(&mut self, entry: T) {
        // Anything after the cursor is discarded; there is no branching.
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(entry);
        self.cursor = Some(self.entries.len() - 1);
        self.debug_check();
    }

    pub fn undo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                self.debug_check();
                true
            }
            _ => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c + 1 < self.entries.len() => {
                self.cursor = Some(c + 1);
                self.debug_check();
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<&T> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    pub fn reset(&mut self) -> Vec<T> {
        self.cursor = None;
        std::mem::take(&mut self.entries)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn cursor_index(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    fn debug_check(&self) {
        debug_assert!(
            match self.cursor {
                None => self.entries.is_empty(),
                Some(c) => c < self.entries.len(),
            },
            "history cursor out of range"
        );
    }
}
