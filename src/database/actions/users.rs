use log::info;
use serde::Serialize;

use crate::{
    authentication::permissions::ActionType,
    constants::{AVATAR_FOLDER, SUBSCRIPTIONS_PATH, USERS_PATH},
    error::{ApiError, Error},
    jwt::SessionData,
    media::{decode_data_uri, MediaStorage},
    pagination::{Page, PageWindow},
    schema::{User, Uuid},
    store::{RecipeFilter, Store},
};

use super::recipes::{short_recipe, RecipeShort};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserProfile {
    /// `is_subscribed` tells whether `viewer` follows `user`.
    pub async fn build(
        store: &dyn Store,
        media: &MediaStorage,
        user: User,
        viewer: Option<&SessionData>,
    ) -> Result<Self, Error> {
        let is_subscribed = match viewer {
            Some(session) => store.is_following(session.user_id, user.id).await?,
            None => false,
        };

        Ok(Self {
            avatar: user.avatar.as_deref().map(|path| media.url(path)),
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        })
    }
}

/// A followed author with a preview of their recipes.
#[derive(Serialize, Debug, Clone)]
pub struct Subscription {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub avatar: String,
}

async fn find_user(store: &dyn Store, id: Uuid) -> Result<User, Error> {
    store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound.new("No user exists with specified id"))
}

/// The session's own user row. A token outliving its user is unauthorized.
async fn session_user(store: &dyn Store, session: &SessionData) -> Result<User, Error> {
    store
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized.new("Invalid session; User doesn't exist"))
}

pub async fn list_users(
    store: &dyn Store,
    media: &MediaStorage,
    window: PageWindow,
    viewer: Option<&SessionData>,
) -> Result<Page<UserProfile>, Error> {
    let (rows, count) = store.list_users(window.limit, window.offset()).await?;

    let mut results = Vec::with_capacity(rows.len());
    for user in rows {
        results.push(UserProfile::build(store, media, user, viewer).await?);
    }

    Page::from_rows(results, count, window, USERS_PATH)
}

pub async fn get_user(
    store: &dyn Store,
    media: &MediaStorage,
    id: Uuid,
    viewer: Option<&SessionData>,
) -> Result<UserProfile, Error> {
    let user = find_user(store, id).await?;
    UserProfile::build(store, media, user, viewer).await
}

pub async fn me(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
) -> Result<UserProfile, Error> {
    let user = session_user(store, session).await?;
    UserProfile::build(store, media, user, Some(session)).await
}

pub async fn set_avatar(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    avatar: Option<&str>,
) -> Result<Avatar, Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;
    let user = session_user(store, session).await?;

    let value = avatar
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Validation.new("This field is required").on("avatar"))?;
    let image = decode_data_uri(value).map_err(|e| e.on("avatar"))?;

    let path = media.save(AVATAR_FOLDER, &image).await?;
    if let Err(e) = store.set_avatar(user.id, Some(&path)).await {
        media.remove(&path).await;
        return Err(e);
    }
    if let Some(old) = &user.avatar {
        media.remove(old).await;
    }
    info!("User {} changed avatar", user.id);

    Ok(Avatar {
        avatar: media.url(&path),
    })
}

pub async fn delete_avatar(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;
    let user = session_user(store, session).await?;

    store.set_avatar(user.id, None).await?;
    if let Some(old) = &user.avatar {
        media.remove(old).await;
    }
    info!("User {} removed avatar", user.id);

    Ok(())
}

async fn subscription(
    store: &dyn Store,
    media: &MediaStorage,
    author: User,
    viewer: &SessionData,
    recipes_limit: Option<i64>,
) -> Result<Subscription, Error> {
    let filter = RecipeFilter {
        author: Some(author.id),
        ..Default::default()
    };
    let limit = recipes_limit.map(|limit| limit.max(0)).unwrap_or(i64::MAX);
    let (recipes, _) = store.list_recipes(&filter, limit, 0).await?;
    let recipes_count = store.count_recipes(author.id).await?;

    Ok(Subscription {
        profile: UserProfile::build(store, media, author, Some(viewer)).await?,
        recipes: recipes
            .iter()
            .map(|recipe| short_recipe(media, recipe))
            .collect(),
        recipes_count,
    })
}

pub async fn list_subscriptions(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    window: PageWindow,
    recipes_limit: Option<i64>,
) -> Result<Page<Subscription>, Error> {
    let (rows, count) = store
        .list_following(session.user_id, window.limit, window.offset())
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for author in rows {
        results.push(subscription(store, media, author, session, recipes_limit).await?);
    }

    Page::from_rows(results, count, window, SUBSCRIPTIONS_PATH)
}

pub async fn subscribe(
    store: &dyn Store,
    media: &MediaStorage,
    session: &SessionData,
    author_id: Uuid,
    recipes_limit: Option<i64>,
) -> Result<Subscription, Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let author = find_user(store, author_id).await?;

    if author.id == session.user_id {
        return Err(ApiError::Validation.new("You can't subscribe to yourself"));
    }
    if !store.add_follow(session.user_id, author.id).await? {
        return Err(ApiError::Conflict.new("You are already subscribed to this user"));
    }
    info!("User {} subscribed to {}", session.user_id, author.id);

    subscription(store, media, author, session, recipes_limit).await
}

pub async fn unsubscribe(
    store: &dyn Store,
    session: &SessionData,
    author_id: Uuid,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let author = find_user(store, author_id).await?;

    if !store.remove_follow(session.user_id, author.id).await? {
        return Err(ApiError::NotFound.new("You are not subscribed to this user"));
    }
    info!("User {} unsubscribed from {}", session.user_id, author.id);

    Ok(())
}
