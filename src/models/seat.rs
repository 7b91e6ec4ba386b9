use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub screen_id: i64,
    pub row_label: String,
    pub number: i32,
}

impl Seat {
    // "A" + 7 -> "A7", как места подписаны на схеме зала
    pub fn label(&self) -> String {
        format!("{}{}", self.row_label, self.number)
    }
}
