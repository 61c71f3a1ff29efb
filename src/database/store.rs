use async_trait::async_trait;

use super::{
    error::Error,
    schema::{
        Ingredient, IngredientAmount, Recipe, RecipeIngredient, Relation, ShoppingListItem, Tag,
        User, Uuid,
    },
};

/// Narrowing applied to the recipe catalog. Empty `tags` means no tag filter;
/// several tags are OR-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

/// Case-insensitive ingredient name match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch<'a> {
    Prefix(&'a str),
    Contains(&'a str),
}

impl NameMatch<'_> {
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self {
            NameMatch::Prefix(value) => name.starts_with(&value.to_lowercase()),
            NameMatch::Contains(value) => name.contains(&value.to_lowercase()),
        }
    }

    /// `ILIKE` pattern with the wildcard characters of the input escaped.
    pub fn pattern(&self) -> String {
        let escape = |value: &str| {
            value
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        };
        match self {
            NameMatch::Prefix(value) => format!("{}%", escape(value)),
            NameMatch::Contains(value) => format!("%{}%", escape(value)),
        }
    }
}

/// A validated recipe aggregate, persisted as one unit.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub author_id: Uuid,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<String>,
    pub short_code: String,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientAmount>,
}

/// Replacement applied to an existing recipe. Scalars are overwritten only
/// when present; tags and ingredients always replace the stored sets.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientAmount>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error>;
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error>;
    async fn set_avatar(&self, user_id: Uuid, avatar: Option<&str>) -> Result<(), Error>;

    async fn is_following(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error>;
    /// Returns `false` when the pair already exists.
    async fn add_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error>;
    /// Returns `false` when there was nothing to delete.
    async fn remove_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error>;
    async fn list_following(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error>;

    async fn list_tags(&self) -> Result<Vec<Tag>, Error>;
    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error>;
    async fn get_tags(&self, ids: &[Uuid]) -> Result<Vec<Tag>, Error>;

    async fn list_ingredients(&self, name: Option<NameMatch<'_>>)
        -> Result<Vec<Ingredient>, Error>;
    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error>;
    async fn get_ingredients(&self, ids: &[Uuid]) -> Result<Vec<Ingredient>, Error>;

    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error>;
    async fn get_recipe_by_code(&self, code: &str) -> Result<Option<Recipe>, Error>;
    async fn short_code_exists(&self, code: &str) -> Result<bool, Error>;
    /// Newest first. Returns the page and the total row count of the filter.
    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error>;
    async fn count_recipes(&self, author_id: Uuid) -> Result<i64, Error>;
    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error>;
    async fn list_recipe_ingredients(&self, recipe_id: Uuid)
        -> Result<Vec<RecipeIngredient>, Error>;
    async fn create_recipe(&self, recipe: &NewRecipe) -> Result<Uuid, Error>;
    async fn update_recipe(&self, id: Uuid, changes: &RecipeChanges) -> Result<(), Error>;
    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error>;

    async fn has_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error>;
    /// Returns `false` when the pair already exists.
    async fn add_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error>;
    /// Returns `false` when there was nothing to delete.
    async fn remove_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error>;

    /// Cart ingredient lines grouped by (name, unit) with summed amounts,
    /// ordered by name then unit.
    async fn shopping_list(&self, user_id: Uuid) -> Result<Vec<ShoppingListItem>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_is_case_insensitive() {
        assert!(NameMatch::Prefix("Fl").matches("flour"));
        assert!(!NameMatch::Prefix("our").matches("flour"));
        assert!(NameMatch::Contains("OUR").matches("flour"));
    }

    #[test]
    fn pattern_escapes_wildcards() {
        assert_eq!(NameMatch::Prefix("50%").pattern(), "50\\%%");
        assert_eq!(NameMatch::Contains("a_b").pattern(), "%a\\_b%");
    }
}
