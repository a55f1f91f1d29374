//! In-place bottom-up heapsort.
//!
//! Relocating elements is assumed to cost more than comparing them, so the
//! sift traces the path of larger children down to a leaf while moving each
//! child up into the hole, and only then walks the displaced element back up
//! (Floyd's variant). The element being placed lives in a single scratch slot
//! for the whole sift; the hole it left holds a `T::default()` placeholder.

use std::mem;

/// Sort `array` ascending under the strict ordering `lt`. Not stable.
pub fn heapsort<T, F>(array: &mut [T], mut lt: F)
where
    T: Default,
    F: FnMut(&T, &T) -> bool,
{
    let len = array.len();
    if len < 2 {
        return;
    }

    for hole in (0..len / 2).rev() {
        sift(array, hole, len, &mut lt);
    }

    for end in (1..len).rev() {
        array.swap(0, end);
        sift(array, 0, end, &mut lt);
    }
}

fn sift<T, F>(array: &mut [T], start: usize, len: usize, lt: &mut F)
where
    T: Default,
    F: FnMut(&T, &T) -> bool,
{
    let scratch = mem::take(&mut array[start]);
    let mut hole = start;

    // Descend along the larger child while both children exist.
    let mut child = 2 * hole + 1;
    while child + 1 < len {
        if lt(&array[child], &array[child + 1]) {
            child += 1;
        }
        array.swap(hole, child);
        hole = child;
        child = 2 * hole + 1;
    }
    // An even heap length leaves one unpaired last child.
    if child < len {
        array.swap(hole, child);
        hole = child;
    }

    while hole > start {
        let parent = (hole - 1) / 2;
        if !lt(&array[parent], &scratch) {
            break;
        }
        array.swap(hole, parent);
        hole = parent;
    }
    array[hole] = scratch;
}
