use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, Pool, Postgres, QueryBuilder};

use super::{
    error::{ApiError, Error, QueryError},
    schema::{
        Ingredient, IngredientAmount, Recipe, RecipeIngredient, Relation, ShoppingListItem, Tag,
        User, Uuid,
    },
    store::{NameMatch, NewRecipe, RecipeChanges, RecipeFilter, Store},
};

#[derive(FromRow)]
struct UserCountRow {
    #[sqlx(flatten)]
    user: User,
    count: i64,
}

#[derive(FromRow)]
struct RecipeCountRow {
    #[sqlx(flatten)]
    recipe: Recipe,
    count: i64,
}

fn split_count<T, R>(rows: Vec<R>, split: impl Fn(R) -> (T, i64)) -> (Vec<T>, i64) {
    let mut total_count = 0;
    let rows = rows
        .into_iter()
        .map(|row| {
            let (value, count) = split(row);
            total_count = count;
            value
        })
        .collect();
    (rows, total_count)
}

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(QueryError::from)?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueryError::from(sqlx::Error::from(e)))?;

        Ok(())
    }
}

async fn insert_lines(
    tr: &mut sqlx::Transaction<'_, Postgres>,
    recipe_id: Uuid,
    tags: &[Uuid],
    ingredients: &[IngredientAmount],
) -> Result<(), Error> {
    if !tags.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        query_builder.push_values(tags.iter(), |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });
        query_builder
            .build()
            .execute(&mut **tr)
            .await
            .map_err(QueryError::from)?;
    }

    if !ingredients.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
        );
        query_builder.push_values(ingredients.iter(), |mut b, line| {
            b.push_bind(recipe_id)
                .push_bind(line.id)
                .push_bind(line.amount);
        });
        query_builder
            .build()
            .execute(&mut **tr)
            .await
            .map_err(QueryError::from)?;
    }

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as(
            "SELECT id, email, username, first_name, last_name, avatar, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error> {
        let rows: Vec<UserCountRow> = sqlx::query_as(
            "
            SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar, u.role, COUNT(*) OVER() AS count
            FROM users u
            ORDER BY u.username
            LIMIT $1 OFFSET $2
        ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(split_count(rows, |row| (row.user, row.count)))
    }

    async fn set_avatar(&self, user_id: Uuid, avatar: Option<&str>) -> Result<(), Error> {
        sqlx::query("UPDATE users SET avatar = $1 WHERE id = $2")
            .bind(avatar)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM follows WHERE user_id = $1 AND following_id = $2")
                .bind(user_id)
                .bind(following_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(row.is_some())
    }

    async fn add_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        if user_id == following_id {
            return Err(ApiError::Validation.new("You can't subscribe to yourself"));
        }
        let result = sqlx::query(
            "INSERT INTO follows (user_id, following_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(following_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_follow(&self, user_id: Uuid, following_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND following_id = $2")
            .bind(user_id)
            .bind(following_id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_following(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        let rows: Vec<UserCountRow> = sqlx::query_as(
            "
            SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar, u.role, COUNT(*) OVER() AS count
            FROM follows f
            INNER JOIN users u ON u.id = f.following_id
            WHERE f.user_id = $1
            ORDER BY u.username
            LIMIT $2 OFFSET $3
        ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(split_count(rows, |row| (row.user, row.count)))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(list)
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(tag)
    }

    async fn get_tags(&self, ids: &[Uuid]) -> Result<Vec<Tag>, Error> {
        let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(list)
    }

    async fn list_ingredients(
        &self,
        name: Option<NameMatch<'_>>,
    ) -> Result<Vec<Ingredient>, Error> {
        let rows: Vec<Ingredient> = match name {
            Some(name) => sqlx::query_as(
                "SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name, measurement_unit",
            )
            .bind(name.pattern())
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?,
            None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, measurement_unit")
                .fetch_all(&self.pool)
                .await
                .map_err(QueryError::from)?,
        };

        Ok(rows)
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error> {
        let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_ingredients(&self, ids: &[Uuid]) -> Result<Vec<Ingredient>, Error> {
        let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_recipe_by_code(&self, code: &str) -> Result<Option<Recipe>, Error> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE short_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn short_code_exists(&self, code: &str) -> Result<bool, Error> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM recipes WHERE short_code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

        if let Some(author) = filter.author {
            query_builder.push(" AND r.author_id = ").push_bind(author);
        }
        if let Some(user_id) = filter.favorited_by {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if let Some(user_id) = filter.in_cart_of {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if !filter.tags.is_empty() {
            query_builder
                .push(
                    " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
                )
                .push_bind(filter.tags.clone())
                .push("))");
        }

        query_builder
            .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<RecipeCountRow> = query_builder
            .build_query_as::<RecipeCountRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(split_count(rows, |row| (row.recipe, row.count)))
    }

    async fn count_recipes(&self, author_id: Uuid) -> Result<i64, Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error> {
        let list: Vec<Tag> = sqlx::query_as(
            "
            SELECT t.id AS id, t.name AS name, t.slug AS slug
            FROM recipe_tags rt
            INNER JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = $1
            ORDER BY t.name
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(list)
    }

    async fn list_recipe_ingredients(
        &self,
        recipe_id: Uuid,
    ) -> Result<Vec<RecipeIngredient>, Error> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(
            "
            SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
            FROM recipe_ingredients ri
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE ri.recipe_id = $1
            ORDER BY i.name, i.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn create_recipe(&self, recipe: &NewRecipe) -> Result<Uuid, Error> {
        let mut tr = self.pool.begin().await.map_err(QueryError::from)?;

        let id: (Uuid,) = sqlx::query_as(
            "
            INSERT INTO recipes (author_id, name, text, cooking_time, image, short_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
        ",
        )
        .bind(recipe.author_id)
        .bind(&recipe.name)
        .bind(&recipe.text)
        .bind(recipe.cooking_time)
        .bind(&recipe.image)
        .bind(&recipe.short_code)
        .fetch_one(&mut *tr)
        .await
        .map_err(QueryError::from)?;

        insert_lines(&mut tr, id.0, &recipe.tags, &recipe.ingredients).await?;

        tr.commit().await.map_err(QueryError::from)?;
        Ok(id.0)
    }

    async fn update_recipe(&self, id: Uuid, changes: &RecipeChanges) -> Result<(), Error> {
        let mut tr = self.pool.begin().await.map_err(QueryError::from)?;

        sqlx::query(
            "
            UPDATE recipes SET
            name = COALESCE($1, name),
            text = COALESCE($2, text),
            cooking_time = COALESCE($3, cooking_time),
            image = COALESCE($4, image)
            WHERE id = $5
        ",
        )
        .bind(&changes.name)
        .bind(&changes.text)
        .bind(changes.cooking_time)
        .bind(&changes.image)
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        insert_lines(&mut tr, id, &changes.tags, &changes.ingredients).await?;

        tr.commit().await.map_err(QueryError::from)?;
        Ok(())
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        let row: Option<(i32,)> = sqlx::query_as(&format!(
            "SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row.is_some())
    }

    async fn add_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_relation(
        &self,
        relation: Relation,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn shopping_list(&self, user_id: Uuid) -> Result<Vec<ShoppingListItem>, Error> {
        let rows: Vec<ShoppingListItem> = sqlx::query_as(
            "
            SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ri.amount) AS amount
            FROM shopping_cart c
            INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE c.user_id = $1
            GROUP BY i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit
        ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }
}
