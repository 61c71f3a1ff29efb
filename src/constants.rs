pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_LENGTH_RECIPE_NAME: usize = 256;
pub const MIN_COOKING_TIME: i32 = 1;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;

pub const SHORT_CODE_LENGTH: usize = 6;
pub const SHORT_CODE_ATTEMPTS: usize = 10;
pub const SHORT_CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const RECIPE_IMAGE_FOLDER: &str = "recipes/images";
pub const AVATAR_FOLDER: &str = "users/avatars";

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";
pub const SHOPPING_LIST_HEADER: &str = "Shopping list";

pub const RECIPES_PATH: &str = "/api/recipes/";
pub const USERS_PATH: &str = "/api/users/";
pub const SUBSCRIPTIONS_PATH: &str = "/api/users/subscriptions/";
