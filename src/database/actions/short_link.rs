use log::{debug, error};
use rand::Rng;
use serde::Serialize;

use crate::{
    constants::{SHORT_CODE_ALPHABET, SHORT_CODE_LENGTH},
    error::{ApiError, Error},
    schema::Uuid,
    store::{NewRecipe, Store},
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShortLink {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

pub fn generate_short_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SHORT_CODE_LENGTH)
        .map(|_| SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Draws codes until one is unused, giving up after `attempts` draws.
pub async fn unique_short_code<R: Rng + Send>(
    store: &dyn Store,
    rng: &mut R,
    attempts: usize,
) -> Result<String, Error> {
    for attempt in 1..=attempts {
        let code = generate_short_code(rng);
        if !store.short_code_exists(&code).await? {
            return Ok(code);
        }
        debug!("Short code {code} collided on attempt {attempt}");
    }

    error!("No free short code after {attempts} attempts");
    Err(ApiError::Internal.new("Failed to generate a unique short link"))
}

/// Inserts `recipe` under a fresh short code. A code taken by a concurrent
/// insert between the check and the write is drawn again, up to `attempts`
/// inserts.
pub async fn insert_with_short_code<R: Rng + Send>(
    store: &dyn Store,
    recipe: &mut NewRecipe,
    rng: &mut R,
    attempts: usize,
) -> Result<Uuid, Error> {
    for attempt in 1..=attempts {
        recipe.short_code = unique_short_code(store, rng, attempts).await?;
        let error = match store.create_recipe(recipe).await {
            Ok(id) => return Ok(id),
            Err(e) => e,
        };
        let collided = error.kind == ApiError::Conflict
            && store.short_code_exists(&recipe.short_code).await?;
        if !collided {
            return Err(error);
        }
        debug!(
            "Short code {} was taken before insert {attempt}",
            recipe.short_code
        );
    }

    error!("No free short code after {attempts} inserts");
    Err(ApiError::Internal.new("Failed to generate a unique short link"))
}

pub fn recipe_url(base_url: &str, recipe_id: Uuid) -> String {
    format!("{}/recipes/{recipe_id}/", base_url.trim_end_matches('/'))
}

pub async fn get_link(
    store: &dyn Store,
    base_url: &str,
    recipe_id: Uuid,
) -> Result<ShortLink, Error> {
    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No recipe exists with specified id"))?;

    Ok(ShortLink {
        short_link: format!(
            "{}/s/{}/",
            base_url.trim_end_matches('/'),
            recipe.short_code
        ),
    })
}

pub async fn resolve_short_link(store: &dyn Store, code: &str) -> Result<Uuid, Error> {
    store
        .get_recipe_by_code(code)
        .await?
        .map(|recipe| recipe.id)
        .ok_or_else(|| ApiError::NotFound.new("Short link doesn't exist"))
}
