use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    error::{ApiError, Error},
    schema::{
        Ingredient, Recipe, RecipeIngredient, Relation, ShoppingListItem, Tag, User, UserRole,
        Uuid,
    },
    store::{NameMatch, NewRecipe, RecipeChanges, RecipeFilter, Store},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    tags: BTreeMap<Uuid, Tag>,
    ingredients: BTreeMap<Uuid, Ingredient>,
    recipes: BTreeMap<Uuid, Recipe>,
    // (recipe_id, tag_id)
    recipe_tags: BTreeSet<(Uuid, Uuid)>,
    // (recipe_id, ingredient_id) -> amount
    recipe_ingredients: BTreeMap<(Uuid, Uuid), i32>,
    // (user_id, recipe_id)
    favorites: BTreeSet<(Uuid, Uuid)>,
    shopping_cart: BTreeSet<(Uuid, Uuid)>,
    // (user_id, following_id)
    follows: BTreeSet<(Uuid, Uuid)>,

    user_seq: Uuid,
    tag_seq: Uuid,
    ingredient_seq: Uuid,
    recipe_seq: Uuid,
}

impl Tables {
    fn relation(&self, relation: Relation) -> &BTreeSet<(Uuid, Uuid)> {
        match relation {
            Relation::Favorite => &self.favorites,
            Relation::ShoppingCart => &self.shopping_cart,
        }
    }

    fn relation_mut(&mut self, relation: Relation) -> &mut BTreeSet<(Uuid, Uuid)> {
        match relation {
            Relation::Favorite => &mut self.favorites,
            Relation::ShoppingCart => &mut self.shopping_cart,
        }
    }

    fn matches(&self, recipe: &Recipe, filter: &RecipeFilter) -> bool {
        if filter.author.is_some_and(|author| author != recipe.author_id) {
            return false;
        }
        if let Some(user_id) = filter.favorited_by {
            if !self.favorites.contains(&(user_id, recipe.id)) {
                return false;
            }
        }
        if let Some(user_id) = filter.in_cart_of {
            if !self.shopping_cart.contains(&(user_id, recipe.id)) {
                return false;
            }
        }
        if !filter.tags.is_empty() {
            return self
                .recipe_tags
                .range((recipe.id, Uuid::MIN)..=(recipe.id, Uuid::MAX))
                .filter_map(|(_, tag_id)| self.tags.get(tag_id))
                .any(|tag| filter.tags.contains(&tag.slug));
        }
        true
    }

    fn check_references(&self, tags: &[Uuid], ingredients: &[Uuid]) -> Result<(), Error> {
        if let Some(id) = tags.iter().find(|id| !self.tags.contains_key(id)) {
            return Err(ApiError::Validation.new(&format!("Tag {id} doesn't exist")));
        }
        if let Some(id) = ingredients
            .iter()
            .find(|id| !self.ingredients.contains_key(id))
        {
            return Err(ApiError::Validation.new(&format!("Ingredient {id} doesn't exist")));
        }
        Ok(())
    }

    fn replace_lines(&mut self, recipe_id: Uuid, tags: &[Uuid], ingredients: &[(Uuid, i32)]) {
        self.recipe_tags.retain(|(recipe, _)| *recipe != recipe_id);
        self.recipe_ingredients
            .retain(|(recipe, _), _| *recipe != recipe_id);

        self.recipe_tags
            .extend(tags.iter().map(|tag_id| (recipe_id, *tag_id)));
        self.recipe_ingredients.extend(
            ingredients
                .iter()
                .map(|(ingredient_id, amount)| ((recipe_id, *ingredient_id), *amount)),
        );
    }
}

/// Store kept entirely in process memory. Every write takes the single table
/// lock, so an aggregate write is never observed half-applied.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(
        &self,
        email: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        role: UserRole,
    ) -> User {
        let mut tables = self.tables.write().await;
        tables.user_seq += 1;
        let user = User {
            id: tables.user_seq,
            email: email.to_string(),
            username: username.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            avatar: None,
            role,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_tag(&self, name: &str, slug: &str) -> Tag {
        let mut tables = self.tables.write().await;
        tables.tag_seq += 1;
        let tag = Tag {
            id: tables.tag_seq,
            name: name.to_string(),
            slug: slug.to_string(),
        };
        tables.tags.insert(tag.id, tag.clone());
        tag
    }

    pub async fn add_ingredient(&self, name: &str, measurement_unit: &str) -> Ingredient {
        let mut tables = self.tables.write().await;
        tables.ingredient_seq += 1;
        let ingredient = Ingredient {
            id: tables.ingredient_seq,
            name: name.to_string(),
            measurement_unit: measurement_unit.to_string(),
        };
        tables.ingredients.insert(ingredient.id, ingredient.clone());
        ingredient
    }
}

fn page<T: Clone>(rows: &[T], limit: i64, offset: i64) -> Vec<T> {
    rows.iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));

        Ok((page(&users, limit, offset), users.len() as i64))
    }

    async fn set_avatar(&self, user_id: Uuid, avatar: Option<&str>) -> Result<(), Error> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.avatar = avatar.map(str::to_string);
        }
        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .contains(&(user_id, following_id)))
    }

    async fn add_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        if user_id == following_id {
            return Err(ApiError::Validation.new("You can't subscribe to yourself"));
        }
        Ok(self
            .tables
            .write()
            .await
            .follows
            .insert((user_id, following_id)))
    }

    async fn remove_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        Ok(self
            .tables
            .write()
            .await
            .follows
            .remove(&(user_id, following_id)))
    }

    async fn list_following(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .filter_map(|(_, following)| tables.users.get(following).cloned())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));

        Ok((page(&users, limit, offset), users.len() as i64))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let mut tags: Vec<Tag> = self.tables.read().await.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        Ok(self.tables.read().await.tags.get(&id).cloned())
    }

    async fn get_tags(&self, ids: &[Uuid]) -> Result<Vec<Tag>, Error> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.tags.get(id).cloned())
            .collect())
    }

    async fn list_ingredients(
        &self,
        name: Option<NameMatch<'_>>,
    ) -> Result<Vec<Ingredient>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Ingredient> = tables
            .ingredients
            .values()
            .filter(|ingredient| name.map_or(true, |name| name.matches(&ingredient.name)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.name, &a.measurement_unit).cmp(&(&b.name, &b.measurement_unit))
        });
        Ok(rows)
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error> {
        Ok(self.tables.read().await.ingredients.get(&id).cloned())
    }

    async fn get_ingredients(&self, ids: &[Uuid]) -> Result<Vec<Ingredient>, Error> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.ingredients.get(id).cloned())
            .collect())
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error> {
        Ok(self.tables.read().await.recipes.get(&id).cloned())
    }

    async fn get_recipe_by_code(&self, code: &str) -> Result<Option<Recipe>, Error> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .values()
            .find(|recipe| recipe.short_code == code)
            .cloned())
    }

    async fn short_code_exists(&self, code: &str) -> Result<bool, Error> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .values()
            .any(|recipe| recipe.short_code == code))
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Recipe> = tables
            .recipes
            .values()
            .filter(|recipe| tables.matches(recipe, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));

        Ok((page(&rows, limit, offset), rows.len() as i64))
    }

    async fn count_recipes(&self, author_id: Uuid) -> Result<i64, Error> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .values()
            .filter(|recipe| recipe.author_id == author_id)
            .count() as i64)
    }

    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error> {
        let tables = self.tables.read().await;
        let mut tags: Vec<Tag> = tables
            .recipe_tags
            .range((recipe_id, Uuid::MIN)..=(recipe_id, Uuid::MAX))
            .filter_map(|(_, tag_id)| tables.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn list_recipe_ingredients(
        &self,
        recipe_id: Uuid,
    ) -> Result<Vec<RecipeIngredient>, Error> {
        let tables = self.tables.read().await;
        let mut lines: Vec<RecipeIngredient> = tables
            .recipe_ingredients
            .range((recipe_id, Uuid::MIN)..=(recipe_id, Uuid::MAX))
            .filter_map(|((_, ingredient_id), amount)| {
                tables
                    .ingredients
                    .get(ingredient_id)
                    .map(|ingredient| RecipeIngredient {
                        id: ingredient.id,
                        name: ingredient.name.to_owned(),
                        measurement_unit: ingredient.measurement_unit.to_owned(),
                        amount: *amount,
                    })
            })
            .collect();
        lines.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(lines)
    }

    async fn create_recipe(&self, recipe: &NewRecipe) -> Result<Uuid, Error> {
        let mut tables = self.tables.write().await;

        let ingredient_ids: Vec<Uuid> = recipe.ingredients.iter().map(|i| i.id).collect();
        tables.check_references(&recipe.tags, &ingredient_ids)?;
        if tables
            .recipes
            .values()
            .any(|existing| existing.short_code == recipe.short_code)
        {
            return Err(ApiError::Conflict.new("Short code is already taken"));
        }

        tables.recipe_seq += 1;
        let id = tables.recipe_seq;
        tables.recipes.insert(
            id,
            Recipe {
                id,
                author_id: recipe.author_id,
                name: recipe.name.to_owned(),
                text: recipe.text.to_owned(),
                cooking_time: recipe.cooking_time,
                image: recipe.image.to_owned(),
                pub_date: Utc::now(),
                short_code: recipe.short_code.to_owned(),
            },
        );

        let lines: Vec<(Uuid, i32)> = recipe
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect();
        tables.replace_lines(id, &recipe.tags, &lines);

        Ok(id)
    }

    async fn update_recipe(&self, id: Uuid, changes: &RecipeChanges) -> Result<(), Error> {
        let mut tables = self.tables.write().await;

        let ingredient_ids: Vec<Uuid> = changes.ingredients.iter().map(|i| i.id).collect();
        tables.check_references(&changes.tags, &ingredient_ids)?;

        let recipe = tables
            .recipes
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound.new("No recipe exists with specified id"))?;

        if let Some(name) = &changes.name {
            recipe.name = name.to_owned();
        }
        if let Some(text) = &changes.text {
            recipe.text = text.to_owned();
        }
        if let Some(cooking_time) = changes.cooking_time {
            recipe.cooking_time = cooking_time;
        }
        if let Some(image) = &changes.image {
            recipe.image = Some(image.to_owned());
        }

        let lines: Vec<(Uuid, i32)> = changes
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect();
        tables.replace_lines(id, &changes.tags, &lines);

        Ok(())
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error> {
        let mut tables = self.tables.write().await;
        if tables.recipes.remove(&id).is_none() {
            return Ok(false);
        }

        tables.replace_lines(id, &[], &[]);
        tables.favorites.retain(|(_, recipe)| *recipe != id);
        tables.shopping_cart.retain(|(_, recipe)| *recipe != id);

        Ok(true)
    }

    async fn has_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        Ok(self
            .tables
            .read()
            .await
            .relation(relation)
            .contains(&(user_id, recipe_id)))
    }

    async fn add_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        Ok(self
            .tables
            .write()
            .await
            .relation_mut(relation)
            .insert((user_id, recipe_id)))
    }

    async fn remove_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        Ok(self
            .tables
            .write()
            .await
            .relation_mut(relation)
            .remove(&(user_id, recipe_id)))
    }

    async fn shopping_list(&self, user_id: Uuid) -> Result<Vec<ShoppingListItem>, Error> {
        let tables = self.tables.read().await;
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();

        let cart = tables
            .shopping_cart
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, recipe_id)| *recipe_id);

        for recipe_id in cart {
            let lines = tables
                .recipe_ingredients
                .range((recipe_id, Uuid::MIN)..=(recipe_id, Uuid::MAX));
            for ((_, ingredient_id), amount) in lines {
                if let Some(ingredient) = tables.ingredients.get(ingredient_id) {
                    *totals
                        .entry((
                            ingredient.name.to_owned(),
                            ingredient.measurement_unit.to_owned(),
                        ))
                        .or_insert(0) += i64::from(*amount);
                }
            }
        }

        Ok(totals
            .into_iter()
            .map(|((name, measurement_unit), amount)| ShoppingListItem {
                name,
                measurement_unit,
                amount,
            })
            .collect())
    }
}
