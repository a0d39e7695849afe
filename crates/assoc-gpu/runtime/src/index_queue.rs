// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Index list and FIFO queue
//!
//! Used by the model loader to collect probe and spike positions before they are
//! materialised into an [`IntArray`]. Both are backed by a single growable buffer;
//! there is no per-node allocation.

use crate::error::{GpuDataError, Result};
use crate::typed_array::IntArray;
use tracing::error;

/// Singly-linked chain of indices, newest first
///
/// `cons` prepends in O(1). Items are stored oldest-first, so the logical head
/// is the last element of the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexList {
    items: Vec<i32>,
}

impl IndexList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `item`; returns the list for chaining
    pub fn cons(mut self, item: i32) -> Self {
        self.items.push(item);
        self
    }

    /// Head value, `None` on an empty chain
    pub fn first(&self) -> Option<i32> {
        self.cursor().first()
    }

    /// Chain after the head (empty on an empty chain)
    pub fn next(&self) -> IndexCursor<'_> {
        self.cursor().next()
    }

    /// Cursor positioned at the head
    pub fn cursor(&self) -> IndexCursor<'_> {
        IndexCursor { items: &self.items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values in chain order (head first)
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.items.iter().rev().copied()
    }

    /// Release every node
    pub fn free(self) {}
}

/// Borrowed position inside an [`IndexList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCursor<'a> {
    items: &'a [i32],
}

impl<'a> IndexCursor<'a> {
    pub fn first(&self) -> Option<i32> {
        self.items.last().copied()
    }

    pub fn next(&self) -> IndexCursor<'a> {
        let rest = match self.items.split_last() {
            Some((_, rest)) => rest,
            None => self.items,
        };
        IndexCursor { items: rest }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// FIFO of indices with an explicit head cursor
#[derive(Debug, Clone, Default)]
pub struct IndexQueue {
    items: Vec<i32>,
    head: usize,
}

impl IndexQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    pub fn push(&mut self, value: i32) {
        self.items.push(value);
    }

    /// Remove and return the head value
    pub fn pop(&mut self) -> Result<i32> {
        let Some(&value) = self.items.get(self.head) else {
            error!("Pop on an empty index queue");
            return Err(GpuDataError::EmptyQueue);
        };
        self.head += 1;
        self.compact();
        Ok(value)
    }

    pub fn peek(&self) -> Option<i32> {
        self.items.get(self.head).copied()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining items in FIFO order
    pub fn as_slice(&self) -> &[i32] {
        &self.items[self.head..]
    }

    /// Drain the remaining items, in FIFO order, into a host-resident array
    pub fn into_int_array(self, name: impl Into<String>) -> Result<IntArray> {
        IntArray::from_slice(self.as_slice(), name)
    }

    /// Release every remaining item without returning them
    pub fn free(self) {}

    // Drop the consumed prefix once it outweighs the live tail
    fn compact(&mut self) {
        if self.head == self.items.len() {
            self.items.clear();
            self.head = 0;
        } else if self.head >= 32 && self.head * 2 >= self.items.len() {
            self.items.drain(..self.head);
            self.head = 0;
        }
    }
}

impl Extend<i32> for IndexQueue {
    fn extend<I: IntoIterator<Item = i32>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl FromIterator<i32> for IndexQueue {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            head: 0,
        }
    }
}
