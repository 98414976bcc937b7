//! Item Catalog
//!
//! The closed set of orderable café items. Loaded once at startup and
//! shared read-only between sessions.

use serde::{Serialize, Deserialize};

/// Catalog item identifier.
pub type ItemId = u32;

/// Item category, used by clients to split the menu into two pickers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    /// Coffee and other drinks
    Drink = 0,
    /// Pastries and cakes
    Dessert = 1,
}

/// An immutable catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique id within the catalog
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Menu category
    pub category: Category,
    /// Visual asset reference, opaque to the server
    pub asset: String,
}

impl Item {
    /// Create a new item.
    pub fn new(id: ItemId, name: &str, category: Category, asset: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            category,
            asset: asset.to_string(),
        }
    }
}

const DRINKS: [&str; 18] = [
    "Lungo",
    "Espresso",
    "Ristretto",
    "Macchiato",
    "Babyccino",
    "Espresso Romano",
    "Long Black",
    "Americano",
    "Flatwhite",
    "Matcha Latte",
    "Piccolo",
    "Latte",
    "Cortado",
    "Iced Black",
    "Iced Filter",
    "Negroni",
    "Iced Latte",
    "Espresso Martini",
];

const DESSERTS: [&str; 14] = [
    "Croissant",
    "Cinnamonroll",
    "Pain au Chocolate",
    "Cheesecake",
    "Carrot Cake",
    "Berry Danish",
    "Brownie",
    "Tiramisu",
    "Muffin",
    "Canele",
    "Chocolate Donut",
    "Eggtart",
    "Macaron",
    "Donut",
];

/// The full menu.
///
/// Items keep the order they were registered in; ids are unique.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    /// Build a catalog from a list of items.
    ///
    /// Returns `None` if two items share an id or the list is empty.
    pub fn from_items(items: Vec<Item>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let mut ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != items.len() {
            return None;
        }
        Some(Self { items })
    }

    /// The café menu: 18 drinks (ids 1-18) then 14 desserts (ids 19-32).
    pub fn cafe_menu() -> Self {
        let drinks = DRINKS.iter().enumerate().map(|(i, name)| {
            Item::new(i as ItemId + 1, name, Category::Drink, &format!("drink_{}", i + 1))
        });
        let desserts = DESSERTS.iter().enumerate().map(|(i, name)| {
            Item::new(
                (DRINKS.len() + i) as ItemId + 1,
                name,
                Category::Dessert,
                &format!("dessert_{}", i + 1),
            )
        });

        Self {
            items: drinks.chain(desserts).collect(),
        }
    }

    /// All items.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id.
    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items of one category, in catalog order.
    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.category == category)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::cafe_menu()
    }
}
