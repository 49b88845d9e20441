// Copyright 2021 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`NameBuilder`] type.

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

/// Incrementally constructs a [`Name`].
///
/// Labels may be added whole with [`NameBuilder::push_label`], or
/// octet by octet with [`NameBuilder::try_push`] and
/// [`NameBuilder::next_label`] (which is how the presentation-format
/// parser uses it). [`NameBuilder::finish`] appends the null label.
///
/// Every method checks the relevant length limit before writing, so a
/// builder can never hold an invalid name.
#[derive(Debug)]
pub(crate) struct NameBuilder {
    wire_repr: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
    current: ArrayVec<u8, MAX_LABEL_LEN>,
}

impl NameBuilder {
    /// Creates a new, empty `NameBuilder`.
    pub fn new() -> Self {
        Self {
            wire_repr: ArrayVec::new(),
            label_offsets: ArrayVec::new(),
            current: ArrayVec::new(),
        }
    }

    /// Appends a complete non-null label.
    pub fn push_label(&mut self, label: &[u8]) -> Result<(), Error> {
        if label.is_empty() {
            return Err(Error::NullNonTerminal);
        } else if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }

        // Leave room for this label's length octet and for the null
        // label that finish will add.
        if self.wire_repr.len() + label.len() + 2 > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        self.label_offsets.push(self.wire_repr.len() as u8);
        self.wire_repr.push(label.len() as u8);
        self.wire_repr
            .try_extend_from_slice(label)
            .or(Err(Error::NameTooLong))
    }

    /// Adds an octet to the label currently being built.
    pub fn try_push(&mut self, octet: u8) -> Result<(), Error> {
        self.current.try_push(octet).or(Err(Error::LabelTooLong))
    }

    /// Completes the label currently being built.
    pub fn next_label(&mut self) -> Result<(), Error> {
        let current = std::mem::take(&mut self.current);
        self.push_label(&current)
    }

    /// Finishes the name, completing the current label (if any) and
    /// appending the null label.
    pub fn finish(mut self) -> Result<Name, Error> {
        if !self.current.is_empty() {
            self.next_label()?;
        }
        self.label_offsets.push(self.wire_repr.len() as u8);
        self.wire_repr.push(0);
        Ok(Name {
            wire_repr: self.wire_repr,
            label_offsets: self.label_offsets,
        })
    }
}
