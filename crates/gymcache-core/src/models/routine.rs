use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

use super::{CachedEntity, ExerciseImage};
use crate::store::{Partition, StorageSlot};

/// A training routine with its full day/exercise graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct CachedRoutine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "routine_days", alias = "days", default)]
    pub days: Vec<RoutineDay>,
}

impl CachedRoutine {
    /// Days ordered by `day_number`. The backend already sorts, but cached
    /// data written by older builds may not be.
    pub fn sorted_days(&self) -> Vec<&RoutineDay> {
        let mut days: Vec<&RoutineDay> = self.days.iter().collect();
        days.sort_by_key(|d| d.day_number);
        days
    }

    pub fn exercise_count(&self) -> usize {
        self.days.iter().map(|d| d.exercises.len()).sum()
    }

    pub fn display_category(&self) -> &str {
        if self.category.is_empty() {
            "General"
        } else {
            &self.category
        }
    }
}

impl CachedEntity for CachedRoutine {
    const PARTITION: Partition = Partition::Routines;
    const SLOT: StorageSlot = StorageSlot::Keyed;
    const LABEL: &'static str = "routines";

    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct RoutineDay {
    pub id: String,
    pub day_number: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "routine_exercises", alias = "exercises", default)]
    pub exercises: Vec<RoutineExercise>,
}

impl RoutineDay {
    pub fn sorted_exercises(&self) -> Vec<&RoutineExercise> {
        let mut exercises: Vec<&RoutineExercise> = self.exercises.iter().collect();
        exercises.sort_by_key(|e| e.order_index);
        exercises
    }

    pub fn title(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("Day {} - {}", self.day_number, name),
            _ => format!("Day {}", self.day_number),
        }
    }
}

/// An exercise assignment within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct RoutineExercise {
    pub id: String,
    pub sets: i32,
    pub reps: String,
    #[serde(default)]
    pub rest_seconds: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    pub order_index: i32,
    // Null when the referenced exercise was deleted on the backend
    #[serde(default)]
    pub exercise: Option<ExerciseSnapshot>,
}

impl RoutineExercise {
    pub fn exercise_name(&self) -> &str {
        self.exercise
            .as_ref()
            .map(|e| e.name.as_str())
            .unwrap_or("Unknown exercise")
    }

    /// e.g. "4 x 8-12, 90s rest"
    pub fn prescription(&self) -> String {
        match self.rest_seconds {
            Some(rest) if rest > 0 => format!("{} x {}, {}s rest", self.sets, self.reps, rest),
            _ => format!("{} x {}", self.sets, self.reps),
        }
    }
}

/// Denormalized copy of the exercise an assignment points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ExerciseSnapshot {
    pub id: String,
    pub name: String,
    pub muscle_group: String,
    #[serde(rename = "exercise_images", alias = "images", default)]
    pub images: Vec<ExerciseImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, order: i32) -> RoutineExercise {
        RoutineExercise {
            id: id.to_string(),
            sets: 3,
            reps: "10".to_string(),
            rest_seconds: Some(60),
            notes: None,
            order_index: order,
            exercise: None,
        }
    }

    #[test]
    fn test_decodes_nested_backend_shape() {
        let json = r#"{
            "id": "r1",
            "name": "Push Pull Legs",
            "description": null,
            "category": "strength",
            "routine_days": [{
                "id": "d1",
                "day_number": 1,
                "name": "Push",
                "routine_exercises": [{
                    "id": "re1",
                    "sets": 4,
                    "reps": "8-12",
                    "rest_seconds": 90,
                    "notes": "slow eccentric",
                    "order_index": 1,
                    "exercise": {
                        "id": "e1",
                        "name": "Bench Press",
                        "muscle_group": "chest",
                        "exercise_images": [{"url": "https://cdn.example/bench.jpg", "order_index": 1}]
                    }
                }]
            }]
        }"#;

        let routine: CachedRoutine = serde_json::from_str(json).unwrap();
        assert_eq!(routine.days.len(), 1);
        let exercise = &routine.days[0].exercises[0];
        assert_eq!(exercise.exercise_name(), "Bench Press");
        assert_eq!(exercise.prescription(), "4 x 8-12, 90s rest");
        assert_eq!(routine.exercise_count(), 1);
    }

    #[test]
    fn test_sorted_days_and_exercises_tolerate_gaps() {
        let routine = CachedRoutine {
            id: "r1".to_string(),
            name: "Split".to_string(),
            description: None,
            category: String::new(),
            days: vec![
                RoutineDay {
                    id: "d3".to_string(),
                    day_number: 5,
                    name: None,
                    exercises: vec![assignment("b", 7), assignment("a", 2)],
                },
                RoutineDay {
                    id: "d1".to_string(),
                    day_number: 1,
                    name: Some("Legs".to_string()),
                    exercises: vec![],
                },
            ],
        };

        let days = routine.sorted_days();
        assert_eq!(days[0].title(), "Day 1 - Legs");
        assert_eq!(days[1].title(), "Day 5");

        let order: Vec<&str> = days[1].sorted_exercises().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(routine.display_category(), "General");
    }

    #[test]
    fn test_missing_exercise_reference() {
        let item = assignment("x", 1);
        assert_eq!(item.exercise_name(), "Unknown exercise");
    }
}
