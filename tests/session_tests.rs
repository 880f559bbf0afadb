//! Application flow: generation, rate limits and persistence

use async_trait::async_trait;
use reverie::session::{
    scenarios_for, AppAction, AppState, AppStatus, ArtifactGenerator, Gender, GenerationPipeline,
    ReprogramArea, Scenario, SharedAppState,
};
use reverie::storage::{AppStorage, JsonFileStore, MusicLibrary};
use reverie::{ReverieError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct ScriptedPipeline {
    images: AtomicUsize,
}

#[async_trait]
impl GenerationPipeline for ScriptedPipeline {
    async fn generate_image(&self, _prompt: &str) -> Result<String> {
        let n = self.images.fetch_add(1, Ordering::SeqCst);
        Ok(format!("data:image/png;base64,SU1H{}", n))
    }

    async fn generate_analysis(&self, title: &str, prompt: &str, gender: Gender) -> Result<String> {
        Ok(format!("{} ({:?}): {}", title, gender, prompt))
    }

    async fn generate_affirmation(&self, _analysis: &str, _gender: Gender) -> Result<String> {
        Ok("I open to what is next.".into())
    }

    async fn generate_narration(&self, _analysis: &str, _gender: Gender) -> Result<String> {
        Ok("AAAAAAAA".into())
    }

    async fn edit_image(&self, _image: &str, _prompt: &str) -> Result<String> {
        Err(ReverieError::IO("edit service offline".into()))
    }
}

fn spiritual_scenario() -> Scenario {
    scenarios_for(ReprogramArea::Spiritual).remove(0)
}

fn prepared_state(scenario: &Scenario) -> SharedAppState {
    let state = SharedAppState::new(AppState::new());
    state.dispatch(AppAction::StartSession);
    state.dispatch(AppAction::SelectArea(scenario.area));
    state.dispatch(AppAction::SelectScenario(scenario.clone()));
    state
}

#[tokio::test]
async fn test_generation_attaches_area_music() {
    let music_dir = TempDir::new().unwrap();
    std::fs::write(music_dir.path().join("spiritual.mp3"), b"ID3 spiritual").unwrap();
    let library = Arc::new(MusicLibrary::new(music_dir.path()));

    let generator =
        ArtifactGenerator::new(Arc::new(ScriptedPipeline::default())).with_music(library.clone());
    let scenario = spiritual_scenario();
    let state = prepared_state(&scenario);

    let artifact = generator.generate(&state, &scenario).await.unwrap();
    assert_eq!(artifact.area, ReprogramArea::Spiritual);
    assert!(artifact.has_music());
    assert!(artifact.has_narration());
    assert!(artifact.analysis.starts_with(&scenario.title));

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, AppStatus::Result);
    assert_eq!(snapshot.current_artifact(), Some(&artifact));
    assert_eq!(snapshot.last_selections.area_id, Some(ReprogramArea::Spiritual));
}

#[tokio::test(start_paused = true)]
async fn test_image_budget_is_enforced() {
    let generator = ArtifactGenerator::new(Arc::new(ScriptedPipeline::default()));
    let scenario = spiritual_scenario();
    let state = prepared_state(&scenario);

    for _ in 0..5 {
        generator.generate(&state, &scenario).await.unwrap();
    }

    let err = generator.generate(&state, &scenario).await.unwrap_err();
    assert!(matches!(err, ReverieError::RateLimited { retry_after_secs, .. } if retry_after_secs <= 60));

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, AppStatus::Error);
    assert!(snapshot.error.unwrap().contains("'image'"));
    assert_eq!(snapshot.history.len(), 5);

    state.dispatch(AppAction::RetryFromError);
    assert_eq!(state.status(), AppStatus::Input);

    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    assert!(generator.generate(&state, &scenario).await.is_ok());
}

#[tokio::test]
async fn test_failed_edit_keeps_image() {
    let generator = ArtifactGenerator::new(Arc::new(ScriptedPipeline::default()));
    let scenario = spiritual_scenario();
    let state = prepared_state(&scenario);
    let artifact = generator.generate(&state, &scenario).await.unwrap();

    assert!(generator.edit_image(&state, "brighter").await.is_err());
    let snapshot = state.snapshot();
    assert!(!snapshot.is_editing_image);
    assert!(snapshot.error.is_some());
    assert_eq!(snapshot.history[0].image, artifact.image);
    assert!(!snapshot.history[0].is_edited());
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let generator = ArtifactGenerator::new(Arc::new(ScriptedPipeline::default()));

    let custom = Scenario::custom(ReprogramArea::Economic, "a river of golden light");
    let state = prepared_state(&custom);
    state.dispatch(AppAction::SetGender(Gender::Male));
    let first = generator.generate(&state, &custom).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = generator.generate(&state, &custom).await.unwrap();
    assert!(first.id.starts_with("custom-"));

    let storage = AppStorage::new(Arc::new(JsonFileStore::open(&path).unwrap()));
    storage.persist(&state.snapshot()).unwrap();
    drop(storage);

    let storage = AppStorage::new(Arc::new(JsonFileStore::open(&path).unwrap()));
    let restored = SharedAppState::new(AppState::new());
    restored.dispatch(storage.initialize_action().unwrap());

    let snapshot = restored.snapshot();
    let ids: Vec<&str> = snapshot.history.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    assert_eq!(snapshot.history[0].gender, Gender::Male);
    assert_eq!(snapshot.last_selections.scenario_id.as_deref(), Some("custom"));

    restored.dispatch(AppAction::DeleteHistoryItem(first.id.clone()));
    storage.persist(&restored.snapshot()).unwrap();
    assert!(storage.history.get(&first.id).unwrap().is_none());
    assert_eq!(storage.history.list().unwrap().len(), 1);
}
