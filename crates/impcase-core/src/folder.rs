//! Folders: named, ordered lists of topic references

use serde::{Deserialize, Serialize};

use impress_frames::Handle;

/// Direction for reordering folders and topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// What the editor is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderView {
    Folder(String),
    /// The scrap bucket of soft-deleted topics
    Scraps,
}

/// A named folder. Names are unique within a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub topics: Vec<Handle>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topics: Vec::new(),
        }
    }

    pub fn contains(&self, topic: Handle) -> bool {
        self.topics.contains(&topic)
    }

    pub fn position(&self, topic: Handle) -> Option<usize> {
        self.topics.iter().position(|&t| t == topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Append unless already present. Returns true if added.
    pub fn insert(&mut self, topic: Handle) -> bool {
        if self.contains(topic) {
            return false;
        }
        self.topics.push(topic);
        true
    }

    pub fn remove(&mut self, topic: Handle) -> bool {
        match self.position(topic) {
            Some(pos) => {
                self.topics.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Swap the element at `pos` with its neighbour in `direction`.
///
/// Returns false (and leaves `items` untouched) at either boundary.
pub(crate) fn swap_adjacent<T>(items: &mut [T], pos: usize, direction: Direction) -> bool {
    let other = match direction {
        Direction::Up if pos > 0 => pos - 1,
        Direction::Down if pos + 1 < items.len() => pos + 1,
        _ => return false,
    };
    items.swap(pos, other);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Direction::Up, false, vec![1, 2, 3])]
    #[case(0, Direction::Down, true, vec![2, 1, 3])]
    #[case(2, Direction::Down, false, vec![1, 2, 3])]
    #[case(2, Direction::Up, true, vec![1, 3, 2])]
    fn test_swap_adjacent(
        #[case] pos: usize,
        #[case] direction: Direction,
        #[case] moved: bool,
        #[case] expected: Vec<i32>,
    ) {
        let mut items = vec![1, 2, 3];
        assert_eq!(swap_adjacent(&mut items, pos, direction), moved);
        assert_eq!(items, expected);
    }
}
