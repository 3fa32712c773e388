use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    // stored as given, there is no hashing
    pub password_hash: String,
}

/// What the browser gets to see of a user.
#[derive(Debug, Serialize)]
pub struct UserView<'a> {
    id: &'a str,
    username: &'a str,
    email: &'a str,
}

impl User {
    pub fn view(&self) -> UserView<'_> {
        UserView {
            id: &self.id,
            username: &self.username,
            email: &self.email,
        }
    }
}
