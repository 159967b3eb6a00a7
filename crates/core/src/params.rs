//! Argument map: free names to positional slots of the one array input
//! parameter.
//!
//! Append-only and shared by every nesting level of a single parse. The
//! first occurrence of a name assigns the next free index; later
//! occurrences, case-folded if configured, reuse it.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ArgMap {
    case_sensitive: bool,
    /// First-seen spellings, in index order.
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ArgMap {
    pub fn new(case_sensitive: bool) -> Self {
        ArgMap {
            case_sensitive,
            names: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_owned()
        } else {
            name.to_lowercase()
        }
    }

    /// Resolve a name to its slot, assigning the next free index on first
    /// occurrence.
    pub fn bind(&mut self, name: &str) -> usize {
        let key = self.key(name);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_owned());
        self.index.insert(key, i);
        i
    }

    /// Slot of an already-bound name, if any.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(&self.key(name)).copied()
    }

    /// First-seen spellings in slot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}
