//! Item registry mapping namespaced string identifiers to item properties.
//!
//! Commands and stored records name items by string (`"minecraft:diamond"`).
//! Every such string goes through [`ItemRegistry::create`], which either
//! returns a typed [`ItemStack`] or an [`ItemError`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Items known to the registry out of the box, with their max stack size.
const VANILLA_ITEMS: &[(&str, u8)] = &[
    ("minecraft:dirt", 64),
    ("minecraft:stone", 64),
    ("minecraft:cobblestone", 64),
    ("minecraft:oak_log", 64),
    ("minecraft:oak_planks", 64),
    ("minecraft:coal", 64),
    ("minecraft:iron_ingot", 64),
    ("minecraft:gold_ingot", 64),
    ("minecraft:diamond", 64),
    ("minecraft:emerald", 64),
    ("minecraft:netherite_ingot", 64),
    ("minecraft:bread", 64),
    ("minecraft:apple", 64),
    ("minecraft:cooked_beef", 64),
    ("minecraft:arrow", 64),
    ("minecraft:torch", 64),
    ("minecraft:ender_pearl", 16),
    ("minecraft:snowball", 16),
    ("minecraft:egg", 16),
    ("minecraft:bow", 1),
    ("minecraft:diamond_sword", 1),
    ("minecraft:diamond_pickaxe", 1),
    ("minecraft:iron_sword", 1),
    ("minecraft:iron_pickaxe", 1),
    ("minecraft:shield", 1),
    ("minecraft:totem_of_undying", 1),
];

const DEFAULT_NAMESPACE: &str = "minecraft";

/// A stack of a single item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced identifier, e.g. `"minecraft:diamond"`.
    pub identifier: String,
    pub count: u32,
}

impl ItemStack {
    /// Build a stack without consulting a registry. Prefer [`ItemRegistry::create`]
    /// for anything typed by a player.
    pub fn new(identifier: impl Into<String>, count: u32) -> Self {
        Self {
            identifier: identifier.into(),
            count,
        }
    }
}

impl std::fmt::Display for ItemStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x {}", self.count, self.identifier)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("unknown item: {0}")]
    Unknown(String),

    #[error("invalid count {count} for {identifier}")]
    InvalidCount { identifier: String, count: u32 },
}

/// Properties for a single item type.
#[derive(Debug, Clone)]
pub struct ItemInfo {
    pub name: String,
    pub max_stack_size: u8,
}

/// Registry of item types that plugins may create.
pub struct ItemRegistry {
    by_name: HashMap<String, ItemInfo>,
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemRegistry {
    /// Build the registry with the vanilla item table.
    pub fn new() -> Self {
        let mut registry = Self {
            by_name: HashMap::with_capacity(VANILLA_ITEMS.len()),
        };
        for (name, max_stack) in VANILLA_ITEMS {
            registry.register_item(name, *max_stack);
        }
        registry
    }

    /// Register (or replace) an item type.
    pub fn register_item(&mut self, name: &str, max_stack_size: u8) {
        let name = normalize(name);
        self.by_name.insert(
            name.clone(),
            ItemInfo {
                name,
                max_stack_size,
            },
        );
    }

    /// Look up item info. Bare names resolve in the `minecraft` namespace.
    pub fn get_by_name(&self, name: &str) -> Option<&ItemInfo> {
        self.by_name.get(&normalize(name))
    }

    /// Resolve an identifier into a stack of `count` items.
    ///
    /// The count may span several stacks but must be non-zero and at most
    /// one inventory's worth (36 stacks).
    pub fn create(&self, identifier: &str, count: u32) -> Result<ItemStack, ItemError> {
        let info = self
            .get_by_name(identifier)
            .ok_or_else(|| ItemError::Unknown(identifier.to_string()))?;
        let max = u32::from(info.max_stack_size) * 36;
        if count == 0 || count > max {
            return Err(ItemError::InvalidCount {
                identifier: info.name.clone(),
                count,
            });
        }
        Ok(ItemStack::new(info.name.clone(), count))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn normalize(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.contains(':') {
        name
    } else {
        format!("{DEFAULT_NAMESPACE}:{name}")
    }
}
