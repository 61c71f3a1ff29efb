use log::info;

use crate::{
    authentication::permissions::ActionType,
    error::{ApiError, Error},
    jwt::SessionData,
    media::MediaStorage,
    schema::{Relation, Uuid},
    store::Store,
};

use super::recipes::{short_recipe, RecipeShort};

fn action(relation: Relation) -> ActionType {
    match relation {
        Relation::Favorite => ActionType::ManageOwnFavorites,
        Relation::ShoppingCart => ActionType::ManageOwnCart,
    }
}

/// Adds the recipe to the caller's favorites or cart.
pub async fn add_relation(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    relation: Relation,
    recipe_id: Uuid,
) -> Result<RecipeShort, Error> {
    session.authenticate(action(relation))?;
    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No recipe exists with specified id"))?;

    if !store
        .add_relation(relation, session.user_id, recipe.id)
        .await?
    {
        return Err(ApiError::Conflict.new(&format!(
            "Recipe is already in {}",
            relation.label()
        )));
    }
    info!(
        "User {} added recipe {} to {}",
        session.user_id,
        recipe.id,
        relation.label()
    );

    Ok(short_recipe(media, &recipe))
}

pub async fn remove_relation(
    store: &dyn Store,
    session: &SessionData,
    relation: Relation,
    recipe_id: Uuid,
) -> Result<(), Error> {
    session.authenticate(action(relation))?;
    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No recipe exists with specified id"))?;

    if !store
        .remove_relation(relation, session.user_id, recipe.id)
        .await?
    {
        return Err(ApiError::NotFound.new(&format!(
            "Recipe is not in {}",
            relation.label()
        )));
    }
    info!(
        "User {} removed recipe {} from {}",
        session.user_id,
        recipe.id,
        relation.label()
    );

    Ok(())
}
