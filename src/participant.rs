// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
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

//! People splitting the bill.

use crate::base::ParticipantId;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Unique within a registry; items reference participants by name.
    pub name: String,
}

/// Participants plus the designated payer.
///
/// # Invariants
///
/// - Names are trimmed, non-empty and unique.
/// - The payer, when set, is a registered name.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    payer: Option<String>,
    next_id: u32,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participant and returns its fresh id.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::EmptyName`] - `name` is empty or whitespace.
    /// - [`ValidationError::DuplicateParticipant`] - the trimmed name exists.
    pub fn add(&mut self, name: &str) -> Result<ParticipantId, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.contains(name) {
            return Err(ValidationError::DuplicateParticipant(name.to_string()));
        }

        let id = loop {
            self.next_id += 1;
            let candidate = ParticipantId(format!("p{}", self.next_id));
            if self.get(&candidate).is_none() {
                break candidate;
            }
        };
        self.participants.push(Participant {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Registers a participant that already carries an id.
    pub(crate) fn insert(&mut self, participant: Participant) -> Result<(), ValidationError> {
        let name = participant.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.contains(&name) {
            return Err(ValidationError::DuplicateParticipant(name));
        }
        if self.get(&participant.id).is_some() {
            return Err(ValidationError::DuplicateParticipant(participant.id.0));
        }
        self.participants.push(Participant {
            id: participant.id,
            name,
        });
        Ok(())
    }

    /// Removes a participant, clearing the payer if it was them.
    ///
    /// Item assignments live in the ledger; use
    /// [`BillContext::remove_participant`](crate::BillContext::remove_participant)
    /// to cascade into them too.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| &p.id == id)?;
        let removed = self.participants.remove(index);
        if self.payer.as_deref() == Some(removed.name.as_str()) {
            self.payer = None;
        }
        Some(removed)
    }

    pub fn set_payer(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        if !self.contains(name) {
            return Err(ValidationError::UnknownParticipant(name.to_string()));
        }
        self.payer = Some(name.to_string());
        Ok(())
    }

    pub fn clear_payer(&mut self) {
        self.payer = None;
    }

    pub fn payer(&self) -> Option<&str> {
        self.payer.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut registry = ParticipantRegistry::new();
        let alice = registry.add("Alice").unwrap();
        registry.remove(&alice).unwrap();
        let bob = registry.add("Bob").unwrap();
        assert_ne!(alice, bob);
    }

    #[test]
    fn add_trims_and_rejects_blank_names() {
        let mut registry = ParticipantRegistry::new();
        let id = registry.add("  Alice ").unwrap();
        assert_eq!(registry.get(&id).unwrap().name, "Alice");
        assert_eq!(registry.add(" \t "), Err(ValidationError::EmptyName));
    }

    #[test]
    fn duplicate_names_are_rejected_after_trimming() {
        let mut registry = ParticipantRegistry::new();
        registry.add("Alice").unwrap();
        assert_eq!(
            registry.add(" Alice"),
            Err(ValidationError::DuplicateParticipant("Alice".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removing_payer_clears_designation() {
        let mut registry = ParticipantRegistry::new();
        let bob = registry.add("Bob").unwrap();
        registry.set_payer("Bob").unwrap();
        registry.remove(&bob);
        assert_eq!(registry.payer(), None);
    }

    #[test]
    fn payer_must_be_registered() {
        let mut registry = ParticipantRegistry::new();
        assert_eq!(
            registry.set_payer("Carol"),
            Err(ValidationError::UnknownParticipant("Carol".into()))
        );
    }
}
