//! Crafting recipes known to the simulated world.

use blockmind_core::world::Inventory;

/// One crafting recipe.
#[derive(Debug, Clone, Copy)]
pub struct Recipe {
    pub output: &'static str,
    /// Items produced per craft
    pub yields: u32,
    pub ingredients: &'static [(&'static str, u32)],
}

const RECIPES: &[Recipe] = &[
    Recipe { output: "oak_planks", yields: 4, ingredients: &[("oak_log", 1)] },
    Recipe { output: "stick", yields: 4, ingredients: &[("oak_planks", 2)] },
    Recipe { output: "crafting_table", yields: 1, ingredients: &[("oak_planks", 4)] },
    Recipe { output: "wooden_pickaxe", yields: 1, ingredients: &[("oak_planks", 3), ("stick", 2)] },
    Recipe { output: "stone_pickaxe", yields: 1, ingredients: &[("cobblestone", 3), ("stick", 2)] },
    Recipe { output: "furnace", yields: 1, ingredients: &[("cobblestone", 8)] },
    Recipe { output: "torch", yields: 4, ingredients: &[("coal", 1), ("stick", 1)] },
];

pub fn lookup(item: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.output == item)
}

impl Recipe {
    /// Ingredients `inventory` is short of for one craft, as `item: n` pairs.
    pub fn missing(&self, inventory: &Inventory) -> Vec<String> {
        self.ingredients
            .iter()
            .filter_map(|(item, need)| {
                let have = inventory.get(*item).copied().unwrap_or(0);
                (have < *need).then(|| format!("{item}: {}", need - have))
            })
            .collect()
    }

    /// Consume one craft's ingredients and add the output.
    pub fn apply(&self, inventory: &mut Inventory) {
        for (item, need) in self.ingredients {
            if let Some(have) = inventory.get_mut(*item) {
                *have -= need;
                if *have == 0 {
                    inventory.remove(*item);
                }
            }
        }
        *inventory.entry(self.output.to_string()).or_default() += self.yields;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafting_consumes_ingredients() {
        let mut inv = Inventory::new();
        inv.insert("oak_log".into(), 2);

        let planks = lookup("oak_planks").unwrap();
        assert!(planks.missing(&inv).is_empty());
        planks.apply(&mut inv);
        assert_eq!(inv.get("oak_log"), Some(&1));
        assert_eq!(inv.get("oak_planks"), Some(&4));
    }

    #[test]
    fn missing_ingredients_are_listed() {
        let mut inv = Inventory::new();
        inv.insert("oak_planks".into(), 1);
        let pickaxe = lookup("wooden_pickaxe").unwrap();
        assert_eq!(pickaxe.missing(&inv), vec!["oak_planks: 2", "stick: 2"]);
        assert!(lookup("diamond_sword").is_none());
    }
}
