use log::info;

use crate::{
    authentication::permissions::ActionType,
    constants::SHOPPING_LIST_HEADER,
    error::Error,
    jwt::SessionData,
    schema::ShoppingListItem,
    store::Store,
};

pub async fn shopping_list(
    store: &dyn Store,
    session: &SessionData,
) -> Result<Vec<ShoppingListItem>, Error> {
    session.authenticate(ActionType::ManageOwnCart)?;
    store.shopping_list(session.user_id).await
}

pub fn render_shopping_list(items: &[ShoppingListItem]) -> String {
    let lines: String = items
        .iter()
        .map(|item| {
            format!(
                "{} ({}) - {}\n",
                item.name, item.measurement_unit, item.amount
            )
        })
        .collect();

    format!("{SHOPPING_LIST_HEADER}\n\n{lines}")
}

pub async fn download_shopping_list(
    store: &dyn Store,
    session: &SessionData,
) -> Result<String, Error> {
    let items = shopping_list(store, session).await?;
    info!(
        "User {} downloaded a shopping list of {} lines",
        session.user_id,
        items.len()
    );

    Ok(render_shopping_list(&items))
}
