use std::collections::HashSet;

use log::info;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    authentication::permissions::ActionType,
    constants::{
        MAX_LENGTH_RECIPE_NAME, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, RECIPES_PATH,
        RECIPE_IMAGE_FOLDER, SHORT_CODE_ATTEMPTS,
    },
    error::{ApiError, Error},
    jwt::SessionData,
    media::{decode_data_uri, DecodedImage, MediaStorage},
    pagination::{Page, PageWindow},
    schema::{IngredientAmount, Recipe, RecipeIngredient, Relation, Tag, Uuid},
    store::{NewRecipe, RecipeChanges, RecipeFilter, Store},
};

use super::{short_link::insert_with_short_code, users::UserProfile};

/// Full nested representation returned by every recipe endpoint.
#[derive(Serialize, Debug, Clone)]
pub struct RecipeRead {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeShort {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

/// Create and update payload. `image` is a base64 data URI.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeWrite {
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
}

/// Catalog narrowing as requested by the caller. The favorite and cart flags
/// only apply to authenticated callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeQuery {
    fn filter(&self, viewer: Option<&SessionData>) -> RecipeFilter {
        let viewer = viewer.map(|session| session.user_id);

        RecipeFilter {
            tags: self.tags.to_owned(),
            author: self.author,
            favorited_by: viewer.filter(|_| self.is_favorited),
            in_cart_of: viewer.filter(|_| self.is_in_shopping_cart),
        }
    }
}

struct ValidatedWrite {
    tags: Vec<Uuid>,
    ingredients: Vec<IngredientAmount>,
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i32>,
    image: Option<DecodedImage>,
}

pub fn short_recipe(media: &MediaStorage, recipe: &Recipe) -> RecipeShort {
    RecipeShort {
        id: recipe.id,
        name: recipe.name.to_owned(),
        image: recipe.image.as_deref().map(|path| media.url(path)),
        cooking_time: recipe.cooking_time,
    }
}

pub async fn read_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    recipe: Recipe,
    viewer: Option<&SessionData>,
) -> Result<RecipeRead, Error> {
    let author = store.get_user(recipe.author_id).await?.ok_or_else(|| {
        log::error!("Recipe {} has no author row", recipe.id);
        ApiError::Internal.default()
    })?;
    let author = UserProfile::build(store, media, author, viewer).await?;

    let tags = store.list_recipe_tags(recipe.id).await?;
    let ingredients = store.list_recipe_ingredients(recipe.id).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(session) => (
            store
                .has_relation(Relation::Favorite, session.user_id, recipe.id)
                .await?,
            store
                .has_relation(Relation::ShoppingCart, session.user_id, recipe.id)
                .await?,
        ),
        None => (false, false),
    };

    Ok(RecipeRead {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
        image: recipe.image.as_deref().map(|path| media.url(path)),
        name: recipe.name,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

async fn find_recipe(store: &dyn Store, id: Uuid) -> Result<Recipe, Error> {
    store
        .get_recipe(id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No recipe exists with specified id"))
}

pub async fn get_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    id: Uuid,
    viewer: Option<&SessionData>,
) -> Result<RecipeRead, Error> {
    let recipe = find_recipe(store, id).await?;
    read_recipe(store, media, recipe, viewer).await
}

pub async fn list_recipes(
    store: &dyn Store,
    media: &MediaStorage,
    query: &RecipeQuery,
    window: PageWindow,
    viewer: Option<&SessionData>,
) -> Result<Page<RecipeRead>, Error> {
    let (rows, count) = store
        .list_recipes(&query.filter(viewer), window.limit, window.offset())
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for recipe in rows {
        results.push(read_recipe(store, media, recipe, viewer).await?);
    }

    Page::from_rows(results, count, window, RECIPES_PATH)
}

fn validate_scalars(write: &RecipeWrite, required: bool) -> Result<(), Error> {
    let missing = |field: &str| ApiError::Validation.new("This field is required").on(field);

    match &write.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::Validation.new("Name must not be blank").on("name"))
        }
        Some(name) if name.chars().count() > MAX_LENGTH_RECIPE_NAME => {
            return Err(ApiError::Validation
                .new(&format!(
                    "Name must be at most {MAX_LENGTH_RECIPE_NAME} characters"
                ))
                .on("name"))
        }
        None if required => return Err(missing("name")),
        _ => {}
    }

    match &write.text {
        Some(text) if text.trim().is_empty() => {
            return Err(ApiError::Validation.new("Text must not be blank").on("text"))
        }
        None if required => return Err(missing("text")),
        _ => {}
    }

    match write.cooking_time {
        Some(cooking_time) if cooking_time < MIN_COOKING_TIME => Err(ApiError::Validation
            .new(&format!(
                "Cooking time must be at least {MIN_COOKING_TIME}"
            ))
            .on("cooking_time")),
        None if required => Err(missing("cooking_time")),
        _ => Ok(()),
    }
}

/// Checks the whole payload before anything is written. The first failure
/// is returned.
async fn validate_write(
    store: &dyn Store,
    write: RecipeWrite,
    required: bool,
) -> Result<ValidatedWrite, Error> {
    let tags = match &write.tags {
        None => return Err(ApiError::Validation.new("Tags are required").on("tags")),
        Some(tags) if tags.is_empty() => {
            return Err(ApiError::Validation.new("Tags must not be empty").on("tags"))
        }
        Some(tags) => tags.to_owned(),
    };
    if tags.iter().collect::<HashSet<_>>().len() != tags.len() {
        return Err(ApiError::Validation
            .new("Tags must not contain duplicates")
            .on("tags"));
    }
    let known = store.get_tags(&tags).await?;
    if let Some(id) = tags.iter().find(|id| !known.iter().any(|tag| tag.id == **id)) {
        return Err(ApiError::Validation
            .new(&format!("Tag {id} doesn't exist"))
            .on("tags"));
    }

    let ingredients = match &write.ingredients {
        None => {
            return Err(ApiError::Validation
                .new("Ingredients are required")
                .on("ingredients"))
        }
        Some(lines) if lines.is_empty() => {
            return Err(ApiError::Validation
                .new("Ingredients must not be empty")
                .on("ingredients"))
        }
        Some(lines) => lines.to_owned(),
    };
    let mut seen = HashSet::new();
    for line in ingredients.iter() {
        if !seen.insert(line.id) {
            return Err(ApiError::Validation
                .new(&format!("Ingredient {} is listed more than once", line.id))
                .on("ingredients"));
        }
        if line.amount < MIN_INGREDIENT_AMOUNT {
            return Err(ApiError::Validation
                .new(&format!("Amount must be at least {MIN_INGREDIENT_AMOUNT}"))
                .on("ingredients"));
        }
    }
    let ids: Vec<Uuid> = ingredients.iter().map(|line| line.id).collect();
    let known = store.get_ingredients(&ids).await?;
    if let Some(id) = ids.iter().find(|id| !known.iter().any(|row| row.id == **id)) {
        return Err(ApiError::Validation
            .new(&format!("Ingredient {id} doesn't exist"))
            .on("ingredients"));
    }

    validate_scalars(&write, required)?;

    let image = write
        .image
        .as_deref()
        .map(|value| decode_data_uri(value).map_err(|e| e.on("image")))
        .transpose()?;

    Ok(ValidatedWrite {
        tags,
        ingredients,
        name: write.name.map(|name| name.trim().to_string()),
        text: write.text,
        cooking_time: write.cooking_time,
        image,
    })
}

pub async fn create_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    write: RecipeWrite,
) -> Result<RecipeRead, Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    let valid = validate_write(store, write, true).await?;

    let image = match &valid.image {
        Some(image) => Some(media.save(RECIPE_IMAGE_FOLDER, image).await?),
        None => None,
    };

    let mut recipe = NewRecipe {
        author_id: session.user_id,
        name: valid.name.unwrap_or_default(),
        text: valid.text.unwrap_or_default(),
        cooking_time: valid.cooking_time.unwrap_or(MIN_COOKING_TIME),
        image,
        short_code: String::new(),
        tags: valid.tags,
        ingredients: valid.ingredients,
    };

    let mut rng = StdRng::from_entropy();
    let id = match insert_with_short_code(store, &mut recipe, &mut rng, SHORT_CODE_ATTEMPTS).await
    {
        Ok(id) => id,
        Err(e) => {
            if let Some(path) = &recipe.image {
                media.remove(path).await;
            }
            return Err(e);
        }
    };
    info!(
        "User {} created recipe {id} ({})",
        session.user_id, recipe.short_code
    );

    get_recipe(store, media, id, Some(session)).await
}

/// Overwrites the supplied scalars and replaces tags and ingredient lines
/// wholesale.
pub async fn update_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Uuid,
    write: RecipeWrite,
) -> Result<RecipeRead, Error> {
    let existing = find_recipe(store, id).await?;
    session.authenticate_owner(existing.author_id)?;

    let valid = validate_write(store, write, false).await?;

    let image = match &valid.image {
        Some(image) => Some(media.save(RECIPE_IMAGE_FOLDER, image).await?),
        None => None,
    };

    let changes = RecipeChanges {
        name: valid.name,
        text: valid.text,
        cooking_time: valid.cooking_time,
        image,
        tags: valid.tags,
        ingredients: valid.ingredients,
    };

    if let Err(e) = store.update_recipe(id, &changes).await {
        if let Some(path) = &changes.image {
            media.remove(path).await;
        }
        return Err(e);
    }
    if let (Some(_), Some(old)) = (&changes.image, &existing.image) {
        media.remove(old).await;
    }
    info!("User {} updated recipe {id}", session.user_id);

    get_recipe(store, media, id, Some(session)).await
}

pub async fn delete_recipe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    id: Uuid,
) -> Result<(), Error> {
    let existing = find_recipe(store, id).await?;
    session.authenticate_owner(existing.author_id)?;

    if !store.delete_recipe(id).await? {
        return Err(ApiError::NotFound.new("No recipe exists with specified id"));
    }
    if let Some(path) = &existing.image {
        media.remove(path).await;
    }
    info!("User {} deleted recipe {id}", session.user_id);

    Ok(())
}
