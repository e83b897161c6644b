use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

use super::CachedEntity;
use crate::store::{Partition, StorageSlot};

/// An entry of the exercise catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct CachedExercise {
    pub id: String,
    pub name: String,
    pub muscle_group: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(rename = "exercise_images", alias = "images", default)]
    pub images: Vec<ExerciseImage>,
}

impl CachedExercise {
    pub fn sorted_images(&self) -> Vec<&ExerciseImage> {
        let mut images: Vec<&ExerciseImage> = self.images.iter().collect();
        images.sort_by_key(|i| i.order_index);
        images
    }

    /// Instruction text split into non-empty steps, one per line.
    pub fn instruction_steps(&self) -> Vec<&str> {
        self.instructions
            .as_deref()
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CachedEntity for CachedExercise {
    const PARTITION: Partition = Partition::Exercises;
    const SLOT: StorageSlot = StorageSlot::Keyed;
    const LABEL: &'static str = "exercises";

    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

/// Reference to a photo held in remote object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ExerciseImage {
    #[serde(alias = "image_url")]
    pub url: String,
    #[serde(default)]
    pub order_index: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_sorted_by_order_index() {
        let json = r#"{
            "id": "e1",
            "name": "Squat",
            "muscle_group": "legs",
            "instructions": "Brace\n\n  Sit back  \nDrive up",
            "exercise_images": [
                {"image_url": "b.jpg", "order_index": 2},
                {"url": "a.jpg", "order_index": 1}
            ]
        }"#;
        let exercise: CachedExercise = serde_json::from_str(json).unwrap();

        let urls: Vec<&str> = exercise.sorted_images().iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["a.jpg", "b.jpg"]);
        assert_eq!(exercise.instruction_steps(), vec!["Brace", "Sit back", "Drive up"]);
        assert!(exercise.description.is_none());
    }
}
