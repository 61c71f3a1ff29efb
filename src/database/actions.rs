pub mod ingredients;
pub mod recipes;
pub mod relations;
pub mod shopping_list;
pub mod short_link;
pub mod tags;
pub mod users;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::{
        jwt::{JwtSessionData, SessionData},
        media::MediaStorage,
        memory::MemoryStore,
        schema::{Ingredient, IngredientAmount, Tag, User, UserRole, Uuid},
    };

    use super::recipes::RecipeWrite;

    pub const BASE_URL: &str = "http://localhost:8000";

    /// A seeded store with two users, three tags and four ingredients.
    pub struct Kitchen {
        pub store: MemoryStore,
        pub media: MediaStorage,
        pub author: User,
        pub reader: User,
        pub tags: Vec<Tag>,
        pub ingredients: Vec<Ingredient>,
        _dir: TempDir,
    }

    impl Kitchen {
        pub async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = MemoryStore::new();

            let author = store
                .add_user("chef@example.com", "chef", "Julia", "Child", UserRole::User)
                .await;
            let reader = store
                .add_user("guest@example.com", "guest", "Anton", "Ego", UserRole::User)
                .await;

            let tags = vec![
                store.add_tag("Breakfast", "breakfast").await,
                store.add_tag("Lunch", "lunch").await,
                store.add_tag("Dinner", "dinner").await,
            ];
            let ingredients = vec![
                store.add_ingredient("flour", "g").await,
                store.add_ingredient("sugar", "g").await,
                store.add_ingredient("milk", "ml").await,
                store.add_ingredient("egg", "pcs").await,
            ];

            Self {
                media: MediaStorage::new(dir.path(), BASE_URL),
                store,
                author,
                reader,
                tags,
                ingredients,
                _dir: dir,
            }
        }

        pub async fn admin(&self) -> User {
            self.store
                .add_user("admin@example.com", "admin", "", "", UserRole::Admin)
                .await
        }

        pub fn tag(&self, slug: &str) -> Uuid {
            self.tags
                .iter()
                .find(|tag| tag.slug == slug)
                .map(|tag| tag.id)
                .unwrap()
        }

        pub fn ingredient(&self, name: &str) -> Uuid {
            self.ingredients
                .iter()
                .find(|ingredient| ingredient.name == name)
                .map(|ingredient| ingredient.id)
                .unwrap()
        }
    }

    pub fn session(user: &User) -> SessionData {
        JwtSessionData::new(user, Duration::hours(1)).into()
    }

    pub fn recipe_write(name: &str, tags: Vec<Uuid>, lines: &[(Uuid, i32)]) -> RecipeWrite {
        RecipeWrite {
            tags: Some(tags),
            ingredients: Some(
                lines
                    .iter()
                    .map(|(id, amount)| IngredientAmount {
                        id: *id,
                        amount: *amount,
                    })
                    .collect(),
            ),
            name: Some(name.to_string()),
            text: Some(format!("How to cook {name}")),
            cooking_time: Some(15),
            image: None,
        }
    }
}
