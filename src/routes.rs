use std::{convert::Infallible, str::FromStr, sync::Arc};

use log::error;
use serde::Deserialize;
use warp::{
    http::{header, Response, StatusCode, Uri},
    reject::Rejection,
    reply::{json, with_status},
    Filter, Reply,
};

use crate::{
    actions::{
        ingredients, recipes,
        recipes::{RecipeQuery, RecipeWrite},
        relations, shopping_list, short_link, tags, users,
    },
    constants::{RECIPE_COUNT_PER_PAGE, SHOPPING_LIST_FILENAME, USER_COUNT_PER_PAGE},
    error::{ApiError, Error, ErrorBody},
    jwt::{SessionData, SessionKeys},
    media::MediaStorage,
    middleware::{with_possible_session, with_session},
    pagination::{PageQuery, PageWindow},
    schema::{Relation, Uuid},
    store::Store,
};

const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub media: MediaStorage,
    pub keys: SessionKeys,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, media: MediaStorage, keys: SessionKeys) -> Self {
        Self { store, media, keys }
    }
}

fn with_context(
    context: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn with_relation(
    relation: Relation,
) -> impl Filter<Extract = (Relation,), Error = Infallible> + Clone {
    warp::any().map(move || relation)
}

/// The raw query string, empty when the request has none.
fn raw_query() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
}

fn json_body<T: for<'de> Deserialize<'de> + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

/// Decoded query pairs. Repeated keys are kept in order.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn parse(raw: &str) -> Self {
        Self(url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    /// Unparsable values are treated as absent.
    fn number<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|value| matches!(value.to_lowercase().as_str(), "1" | "true"))
    }

    fn window(&self, default_limit: i64) -> Result<PageWindow, Error> {
        let page = match self.get("page") {
            Some(page) => Some(
                page.trim()
                    .parse::<i64>()
                    .map_err(|_| ApiError::NotFound.new("Invalid page").on("page"))?,
            ),
            None => None,
        };

        PageQuery {
            page,
            limit: self.number("limit"),
        }
        .window(default_limit)
    }

    fn recipe_query(&self) -> Result<RecipeQuery, Error> {
        let author = match self.get("author") {
            Some(author) => Some(author.trim().parse::<Uuid>().map_err(|_| {
                ApiError::Validation
                    .new("Author must be a user id")
                    .on("author")
            })?),
            None => None,
        };

        Ok(RecipeQuery {
            author,
            tags: self.all("tags"),
            is_favorited: self.flag("is_favorited"),
            is_in_shopping_cart: self.flag("is_in_shopping_cart"),
        })
    }
}

fn no_content() -> impl Reply {
    with_status(warp::reply(), StatusCode::NO_CONTENT)
}

pub fn tag_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(list_tags_handler);

    let detail = warp::path!("api" / "tags" / Uuid)
        .and(warp::get())
        .and(with_context(context))
        .and_then(get_tag_handler);

    list.or(detail)
}

async fn list_tags_handler(context: AppContext) -> Result<impl Reply, Rejection> {
    let list = tags::list_tags(context.store.as_ref())
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&list))
}

async fn get_tag_handler(id: Uuid, context: AppContext) -> Result<impl Reply, Rejection> {
    let tag = tags::get_tag(context.store.as_ref(), id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&tag))
}

pub fn ingredient_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(raw_query())
        .and(with_context(context.clone()))
        .and_then(search_ingredients_handler);

    let detail = warp::path!("api" / "ingredients" / Uuid)
        .and(warp::get())
        .and(with_context(context))
        .and_then(get_ingredient_handler);

    list.or(detail)
}

async fn search_ingredients_handler(
    query: String,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let params = QueryParams::parse(&query);
    let rows = ingredients::search_ingredients(context.store.as_ref(), params.get("name"))
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&rows))
}

async fn get_ingredient_handler(id: Uuid, context: AppContext) -> Result<impl Reply, Rejection> {
    let row = ingredients::get_ingredient(context.store.as_ref(), id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&row))
}

pub fn recipe_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let keys = context.keys.clone();

    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(raw_query())
        .and(with_possible_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(list_recipes_handler);

    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and(json_body::<RecipeWrite>())
        .and_then(create_recipe_handler);

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(download_shopping_cart_handler);

    let detail = warp::path!("api" / "recipes" / Uuid)
        .and(warp::get())
        .and(with_possible_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(get_recipe_handler);

    let update = warp::path!("api" / "recipes" / Uuid)
        .and(warp::patch())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and(json_body::<RecipeWrite>())
        .and_then(update_recipe_handler);

    let delete = warp::path!("api" / "recipes" / Uuid)
        .and(warp::delete())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(delete_recipe_handler);

    let get_link = warp::path!("api" / "recipes" / Uuid / "get-link")
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(get_link_handler);

    let favorite = warp::path!("api" / "recipes" / Uuid / "favorite")
        .and(with_relation(Relation::Favorite));
    let cart = warp::path!("api" / "recipes" / Uuid / "shopping_cart")
        .and(with_relation(Relation::ShoppingCart));
    let relation = favorite.or(cart).unify();

    let add_relation = relation
        .clone()
        .and(warp::post())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(add_relation_handler);

    let remove_relation = relation
        .and(warp::delete())
        .and(with_session(keys))
        .and(with_context(context))
        .and_then(remove_relation_handler);

    list.or(create)
        .or(download)
        .or(detail)
        .or(update)
        .or(delete)
        .or(get_link)
        .or(add_relation)
        .or(remove_relation)
}

async fn list_recipes_handler(
    query: String,
    viewer: Option<SessionData>,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let params = QueryParams::parse(&query);
    let window = params
        .window(RECIPE_COUNT_PER_PAGE)
        .map_err(warp::reject::custom)?;
    let query = params.recipe_query().map_err(warp::reject::custom)?;

    let page = recipes::list_recipes(
        context.store.as_ref(),
        &context.media,
        &query,
        window,
        viewer.as_ref(),
    )
    .await
    .map_err(warp::reject::custom)?;
    Ok(json(&page))
}

async fn create_recipe_handler(
    session: SessionData,
    context: AppContext,
    write: RecipeWrite,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::create_recipe(context.store.as_ref(), &context.media, &session, write)
        .await
        .map_err(warp::reject::custom)?;
    Ok(with_status(json(&recipe), StatusCode::CREATED))
}

async fn get_recipe_handler(
    id: Uuid,
    viewer: Option<SessionData>,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe(context.store.as_ref(), &context.media, id, viewer.as_ref())
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&recipe))
}

async fn update_recipe_handler(
    id: Uuid,
    session: SessionData,
    context: AppContext,
    write: RecipeWrite,
) -> Result<impl Reply, Rejection> {
    let recipe =
        recipes::update_recipe(context.store.as_ref(), &context.media, &session, id, write)
            .await
            .map_err(warp::reject::custom)?;
    Ok(json(&recipe))
}

async fn delete_recipe_handler(
    id: Uuid,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    recipes::delete_recipe(context.store.as_ref(), &context.media, &session, id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(no_content())
}

async fn get_link_handler(id: Uuid, context: AppContext) -> Result<impl Reply, Rejection> {
    let link = short_link::get_link(context.store.as_ref(), context.media.base_url(), id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&link))
}

async fn add_relation_handler(
    id: Uuid,
    relation: Relation,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let recipe =
        relations::add_relation(context.store.as_ref(), &context.media, &session, relation, id)
            .await
            .map_err(warp::reject::custom)?;
    Ok(with_status(json(&recipe), StatusCode::CREATED))
}

async fn remove_relation_handler(
    id: Uuid,
    relation: Relation,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    relations::remove_relation(context.store.as_ref(), &session, relation, id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(no_content())
}

async fn download_shopping_cart_handler(
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let text = shopping_list::download_shopping_list(context.store.as_ref(), &session)
        .await
        .map_err(warp::reject::custom)?;

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .body(text)
        .map_err(|e| {
            error!("Failed to build shopping list response: {e}");
            warp::reject::custom(ApiError::Internal.default())
        })
}

#[derive(Deserialize, Debug)]
struct AvatarWrite {
    avatar: Option<String>,
}

pub fn user_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let keys = context.keys.clone();

    let list = warp::path!("api" / "users")
        .and(warp::get())
        .and(raw_query())
        .and(with_possible_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(list_users_handler);

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(me_handler);

    let set_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::put())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and(json_body::<AvatarWrite>())
        .and_then(set_avatar_handler);

    let delete_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::delete())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(delete_avatar_handler);

    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(raw_query())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(list_subscriptions_handler);

    let detail = warp::path!("api" / "users" / Uuid)
        .and(warp::get())
        .and(with_possible_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(get_user_handler);

    let subscribe = warp::path!("api" / "users" / Uuid / "subscribe")
        .and(warp::post())
        .and(raw_query())
        .and(with_session(keys.clone()))
        .and(with_context(context.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("api" / "users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(with_session(keys))
        .and(with_context(context))
        .and_then(unsubscribe_handler);

    list.or(me)
        .or(set_avatar)
        .or(delete_avatar)
        .or(subscriptions)
        .or(detail)
        .or(subscribe)
        .or(unsubscribe)
}

async fn list_users_handler(
    query: String,
    viewer: Option<SessionData>,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let window = QueryParams::parse(&query)
        .window(USER_COUNT_PER_PAGE)
        .map_err(warp::reject::custom)?;

    let page = users::list_users(context.store.as_ref(), &context.media, window, viewer.as_ref())
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&page))
}

async fn get_user_handler(
    id: Uuid,
    viewer: Option<SessionData>,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let profile = users::get_user(context.store.as_ref(), &context.media, id, viewer.as_ref())
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&profile))
}

async fn me_handler(session: SessionData, context: AppContext) -> Result<impl Reply, Rejection> {
    let profile = users::me(context.store.as_ref(), &context.media, &session)
        .await
        .map_err(warp::reject::custom)?;
    Ok(json(&profile))
}

async fn set_avatar_handler(
    session: SessionData,
    context: AppContext,
    write: AvatarWrite,
) -> Result<impl Reply, Rejection> {
    let avatar = users::set_avatar(
        context.store.as_ref(),
        &context.media,
        &session,
        write.avatar.as_deref(),
    )
    .await
    .map_err(warp::reject::custom)?;
    Ok(json(&avatar))
}

async fn delete_avatar_handler(
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    users::delete_avatar(context.store.as_ref(), &context.media, &session)
        .await
        .map_err(warp::reject::custom)?;
    Ok(no_content())
}

async fn list_subscriptions_handler(
    query: String,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let params = QueryParams::parse(&query);
    let window = params
        .window(USER_COUNT_PER_PAGE)
        .map_err(warp::reject::custom)?;

    let page = users::list_subscriptions(
        context.store.as_ref(),
        &context.media,
        &session,
        window,
        params.number("recipes_limit"),
    )
    .await
    .map_err(warp::reject::custom)?;
    Ok(json(&page))
}

async fn subscribe_handler(
    id: Uuid,
    query: String,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let recipes_limit = QueryParams::parse(&query).number("recipes_limit");

    let subscription = users::subscribe(
        context.store.as_ref(),
        &context.media,
        &session,
        id,
        recipes_limit,
    )
    .await
    .map_err(warp::reject::custom)?;
    Ok(with_status(json(&subscription), StatusCode::CREATED))
}

async fn unsubscribe_handler(
    id: Uuid,
    session: SessionData,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    users::unsubscribe(context.store.as_ref(), &session, id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(no_content())
}

pub fn short_link_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("s" / String)
        .and(warp::get())
        .and(with_context(context))
        .and_then(resolve_short_link_handler)
}

async fn resolve_short_link_handler(
    code: String,
    context: AppContext,
) -> Result<impl Reply, Rejection> {
    let id = short_link::resolve_short_link(context.store.as_ref(), &code)
        .await
        .map_err(warp::reject::custom)?;

    let location: Uri = short_link::recipe_url(context.media.base_url(), id)
        .parse()
        .map_err(|e| {
            error!("Invalid recipe url for {id}: {e}");
            warp::reject::custom(ApiError::Internal.default())
        })?;
    Ok(warp::redirect::found(location))
}

pub fn media_routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("media").and(warp::fs::dir(context.media.root().to_path_buf()))
}

/// Renders every rejection as an `ErrorBody`.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let error = if let Some(e) = err.find::<Error>() {
        e.to_owned()
    } else if err.is_not_found() {
        ApiError::NotFound.default()
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::Validation.new(&format!("Invalid JSON body: {e}"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::Validation.new("Request body is too large")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiError::Validation.new("Request body must be JSON")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ApiError::Validation.new("Missing content length")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::MethodNotAllowed.default()
    } else {
        error!("Unhandled rejection: {err:?}");
        ApiError::Internal.default()
    };

    Ok(with_status(json(&ErrorBody::from(&error)), error.status()))
}

pub fn routes(
    context: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    tag_routes(context.clone())
        .or(ingredient_routes(context.clone()))
        .or(recipe_routes(context.clone()))
        .or(user_routes(context.clone()))
        .or(short_link_routes(context.clone()))
        .or(media_routes(context))
        .recover(handle_rejection)
        .with(warp::log("foodgram::http"))
}
