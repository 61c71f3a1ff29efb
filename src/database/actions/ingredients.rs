use log::debug;

use crate::{
    error::{ApiError, Error},
    schema::{Ingredient, Uuid},
    store::{NameMatch, Store},
};

/// Prefix match on the name, falling back to a substring match when no
/// ingredient starts with `name`. A blank name lists the whole catalog.
pub async fn search_ingredients(
    store: &dyn Store,
    name: Option<&str>,
) -> Result<Vec<Ingredient>, Error> {
    let name = match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => return store.list_ingredients(None).await,
    };

    let rows = store.list_ingredients(Some(NameMatch::Prefix(name))).await?;
    if !rows.is_empty() {
        return Ok(rows);
    }

    debug!("No ingredient starts with {name:?}, searching substrings");
    store.list_ingredients(Some(NameMatch::Contains(name))).await
}

pub async fn get_ingredient(store: &dyn Store, id: Uuid) -> Result<Ingredient, Error> {
    store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No ingredient exists with specified id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::fixtures::Kitchen;

    fn names(rows: Vec<Ingredient>) -> Vec<String> {
        rows.into_iter().map(|row| row.name).collect()
    }

    #[tokio::test]
    async fn prefix_match_wins() {
        let kitchen = Kitchen::new().await;
        kitchen.store.add_ingredient("cauliflower", "g").await;

        let rows = search_ingredients(&kitchen.store, Some("FL")).await.unwrap();
        assert_eq!(names(rows), ["flour"]);
    }

    #[tokio::test]
    async fn falls_back_to_substring() {
        let kitchen = Kitchen::new().await;
        kitchen.store.add_ingredient("buttermilk", "ml").await;

        let rows = search_ingredients(&kitchen.store, Some("ilk")).await.unwrap();
        assert_eq!(names(rows), ["buttermilk", "milk"]);
    }

    #[tokio::test]
    async fn blank_name_lists_everything_by_name() {
        let kitchen = Kitchen::new().await;

        let rows = search_ingredients(&kitchen.store, Some("  ")).await.unwrap();
        assert_eq!(names(rows), ["egg", "flour", "milk", "sugar"]);
    }

    #[tokio::test]
    async fn unknown_ingredient_is_not_found() {
        let kitchen = Kitchen::new().await;

        assert_eq!(
            get_ingredient(&kitchen.store, 404).await.unwrap_err().kind,
            ApiError::NotFound
        );
    }
}
