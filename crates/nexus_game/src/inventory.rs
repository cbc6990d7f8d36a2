//! Fixed-slot inventory.

use serde::{Deserialize, Serialize};

use crate::GameError;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: u32,
    pub quantity: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
}

impl Inventory {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
        }
    }

    pub fn slot(&self, index: usize) -> Result<Option<ItemStack>, GameError> {
        self.slots.get(index).copied().ok_or(GameError::InvalidSlot)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Places a stack in the first empty slot.
    pub fn add(&mut self, stack: ItemStack) -> Result<usize, GameError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::SlotOccupied)?;
        self.slots[index] = Some(stack);
        Ok(index)
    }

    /// Moves a stack into an empty slot. Moving onto a filled slot is
    /// refused; use [`Inventory::swap`] for that.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), GameError> {
        if from >= self.slots.len() || to >= self.slots.len() {
            return Err(GameError::InvalidSlot);
        }
        if from == to {
            return Ok(());
        }
        if self.slots[to].is_some() {
            return Err(GameError::SlotOccupied);
        }
        self.slots[to] = self.slots[from].take();
        Ok(())
    }

    /// Swaps two slots (either may be empty).
    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), GameError> {
        if a >= self.slots.len() || b >= self.slots.len() {
            return Err(GameError::InvalidSlot);
        }
        self.slots.swap(a, b);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<ItemStack>, GameError> {
        if index >= self.slots.len() {
            return Err(GameError::InvalidSlot);
        }
        Ok(self.slots[index].take())
    }
}
