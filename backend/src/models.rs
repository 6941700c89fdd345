use diesel::prelude::*;

use crate::storage::{StorageError, StoredMatch};

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = crate::schema::match_statistics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MatchRecord {
    pub match_id: String,
    pub map_name: String,
    pub statistics: serde_json::Value,
    pub heatmaps: serde_json::Value,
    pub created_at: chrono::NaiveDateTime,
}

impl TryFrom<&StoredMatch> for MatchRecord {
    type Error = StorageError;

    fn try_from(value: &StoredMatch) -> Result<Self, Self::Error> {
        Ok(Self {
            match_id: value.statistics.match_id.clone(),
            map_name: value.statistics.map_name.clone(),
            statistics: serde_json::to_value(&value.statistics)?,
            heatmaps: serde_json::to_value(&value.heatmaps)?,
            created_at: value.stored_at.naive_utc(),
        })
    }
}

impl TryFrom<MatchRecord> for StoredMatch {
    type Error = StorageError;

    fn try_from(value: MatchRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            statistics: serde_json::from_value(value.statistics)?,
            heatmaps: serde_json::from_value(value.heatmaps)?,
            stored_at: value.created_at.and_utc(),
        })
    }
}
