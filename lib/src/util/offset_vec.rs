use std::fmt;
use std::iter::{Enumerate, FromIterator, Map};
use std::ops::Sub;
use std::vec;

/// Elements taking up some number of slots
pub trait Width {
    fn width(&self) -> usize;
}

/// Position in an [`OffsetVec`], counted in slots
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

/// Vector whose elements are addressed by slot offset as well as by index
///
/// Class files are full of these: constant pool entries for `long` and `double` take two slots,
/// and so do the same types on the operand stack.
#[derive(Clone)]
pub struct OffsetVec<T> {
    entries: Vec<(Offset, T)>,

    /// Offset of the first element (the constant pool starts at 1)
    start: Offset,

    /// Offset the next element will get
    end: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    pub fn new_starting_at(start: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            start,
            end: start,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next element would get
    pub fn offset_len(&self) -> Offset {
        self.end
    }

    pub fn push(&mut self, element: T) -> Offset {
        let offset = self.end;
        self.end.0 += element.width();
        self.entries.push((offset, element));
        offset
    }

    /// Remove the last element, returning it with its offset and index
    pub fn pop(&mut self) -> Option<(Offset, usize, T)> {
        let (offset, element) = self.entries.pop()?;
        self.end = offset;
        Some((offset, self.entries.len(), element))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.end = self.start;
    }

    /// Element starting exactly at `offset`
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(start, _)| *start)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Offset, usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, (offset, element))| (*offset, idx, element))
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: PartialEq> PartialEq for OffsetVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for OffsetVec<T> {}

type Indexed<T> = (usize, (Offset, T));
type Positioned<T> = (Offset, usize, T);

fn with_index<T>((idx, (offset, element)): Indexed<T>) -> Positioned<T> {
    (offset, idx, element)
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = Positioned<T>;
    type IntoIter = Map<Enumerate<vec::IntoIter<(Offset, T)>>, fn(Indexed<T>) -> Positioned<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .into_iter()
            .enumerate()
            .map(with_index as fn(Indexed<T>) -> Positioned<T>)
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elements: I) -> Self {
        let mut vec = OffsetVec::new();
        vec.extend(elements);
        vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, elements: I) {
        for element in elements {
            self.push(element);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(offset, element)| (offset.0, element)))
            .finish()
    }
}
