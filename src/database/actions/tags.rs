use crate::{
    error::{ApiError, Error},
    schema::{Tag, Uuid},
    store::Store,
};

pub async fn list_tags(store: &dyn Store) -> Result<Vec<Tag>, Error> {
    store.list_tags().await
}

pub async fn get_tag(store: &dyn Store, id: Uuid) -> Result<Tag, Error> {
    store
        .get_tag(id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No tag exists with specified id"))
}
