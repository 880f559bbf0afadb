//! Application state machine
//!
//! `reduce` is a pure function of state and action. Actions that do not apply
//! in the current state return the state unchanged.

use super::types::{
    AppAction, AppState, AppStatus, FormStep, GeneratedArtifact, LastSelections, LoadingStep,
    UserInput,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

pub fn reduce(state: AppState, action: AppAction) -> AppState {
    let mut next = state;
    match action {
        AppAction::Initialize {
            history,
            last_selections,
        } => {
            next.history = history;
            next.last_selections = last_selections;
        }

        AppAction::StartSession => {
            next.status = AppStatus::Input;
            next.form_step = FormStep::Area;
            next.user_input = UserInput::default();
            next.generated = None;
            next.error = None;
        }

        AppAction::SelectArea(area) if next.status == AppStatus::Input => {
            if next.user_input.area != Some(area) {
                next.user_input.scenario = None;
            }
            next.user_input.area = Some(area);
            next.form_step = FormStep::Scenario;
        }

        AppAction::SelectScenario(scenario) if next.status == AppStatus::Input => {
            next.user_input.scenario = Some(scenario);
        }

        AppAction::SetGender(gender) if next.status == AppStatus::Input => {
            next.user_input.gender = gender;
        }

        AppAction::GoToStep(step) if next.status == AppStatus::Input => {
            // The scenario step needs an area
            if step == FormStep::Area || next.user_input.area.is_some() {
                next.form_step = step;
            }
        }

        AppAction::StartGeneration if next.status != AppStatus::Loading => {
            next.status = AppStatus::Loading;
            next.loading_step = Some(LoadingStep::Prompt);
            next.error = None;
            next.generated = None;
            next.viewing_history_item = None;
        }

        AppAction::SetLoadingStep(step) if next.status == AppStatus::Loading => {
            next.loading_step = Some(step);
        }

        AppAction::GenerationSuccess(artifact) if next.status == AppStatus::Loading => {
            next.last_selections = LastSelections {
                area_id: next.user_input.area.or(Some(artifact.area)),
                scenario_id: next
                    .user_input
                    .scenario
                    .as_ref()
                    .map(|scenario| scenario.id.clone()),
            };
            next.history.insert(0, artifact.clone());
            next.generated = Some(artifact);
            next.status = AppStatus::Result;
            next.loading_step = None;
        }

        AppAction::GenerationFailure(message) if next.status == AppStatus::Loading => {
            next.status = AppStatus::Error;
            next.error = Some(message);
            next.loading_step = None;
        }

        AppAction::RetryFromError if next.status == AppStatus::Error => {
            next.status = AppStatus::Input;
            next.form_step = FormStep::Scenario;
            next.error = None;
        }

        AppAction::ResetSession => {
            next.status = AppStatus::Input;
            next.form_step = FormStep::Area;
            next.user_input = UserInput::default();
            next.generated = None;
            next.error = None;
            next.viewing_history_item = None;
        }

        AppAction::StartOver => {
            next.status = AppStatus::Welcome;
            next.viewing_history_item = None;
            next.generated = None;
            next.error = None;
        }

        AppAction::ViewHistory => {
            next.status = AppStatus::History;
            next.viewing_history_item = None;
        }

        AppAction::ViewHistoryItem(artifact) => {
            next.status = AppStatus::Result;
            next.viewing_history_item = Some(artifact);
        }

        AppAction::DeleteHistoryItem(id) => {
            next.history.retain(|artifact| artifact.id != id);
        }

        AppAction::EditImageStart if next.current_artifact().is_some() && !next.is_editing_image => {
            next.is_editing_image = true;
            next.error = None;
        }

        AppAction::EditImageSuccess {
            image_id,
            new_image,
        } if next.is_editing_image => {
            next.is_editing_image = false;
            update_artifacts(&mut next, &image_id, |artifact| {
                if artifact.original_image.is_none() {
                    artifact.original_image = Some(std::mem::take(&mut artifact.image));
                }
                artifact.image = new_image.clone();
            });
        }

        AppAction::EditImageFailure(message) if next.is_editing_image => {
            next.is_editing_image = false;
            next.error = Some(message);
        }

        AppAction::UndoImageEdit(image_id) => {
            update_artifacts(&mut next, &image_id, |artifact| {
                if let Some(original) = artifact.original_image.take() {
                    artifact.image = original;
                }
            });
        }

        action => {
            debug!("Ignoring {:?} in {} state", action, next.status);
        }
    }
    next
}

/// Apply `f` to every copy of the artifact with `id`
fn update_artifacts(state: &mut AppState, id: &str, f: impl Fn(&mut GeneratedArtifact)) {
    let copies = state
        .generated
        .iter_mut()
        .chain(state.viewing_history_item.iter_mut())
        .chain(state.history.iter_mut());
    for artifact in copies.filter(|artifact| artifact.id == id) {
        f(artifact);
    }
}

/// Thread-safe application state with a dispatch entry point
#[derive(Clone, Default)]
pub struct SharedAppState {
    inner: Arc<RwLock<AppState>>,
}

impl SharedAppState {
    pub fn new(state: AppState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Run the reducer; returns whether the state changed
    pub fn dispatch(&self, action: AppAction) -> bool {
        let mut state = self.inner.write();
        let next = reduce(state.clone(), action);
        let changed = next != *state;
        *state = next;
        changed
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, AppState> {
        self.inner.read()
    }

    /// Copy of the current state (no lock held after return)
    pub fn snapshot(&self) -> AppState {
        self.inner.read().clone()
    }

    pub fn status(&self) -> AppStatus {
        self.inner.read().status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{Gender, ReprogramArea, Scenario};

    fn artifact(id: &str) -> GeneratedArtifact {
        GeneratedArtifact {
            id: id.into(),
            image: format!("data:image/png;base64,{}", id),
            area: ReprogramArea::Physical,
            analysis: "analysis".into(),
            affirmation: "affirmation".into(),
            ..Default::default()
        }
    }

    fn apply(state: AppState, actions: Vec<AppAction>) -> AppState {
        actions.into_iter().fold(state, reduce)
    }

    fn loading_state() -> AppState {
        let scenario = Scenario::new("phys-1", ReprogramArea::Physical, "Title", "Prompt");
        apply(
            AppState::new(),
            vec![
                AppAction::StartSession,
                AppAction::SelectArea(ReprogramArea::Physical),
                AppAction::SelectScenario(scenario),
                AppAction::SetGender(Gender::Female),
                AppAction::StartGeneration,
            ],
        )
    }

    #[test]
    fn test_form_flow() {
        let state = apply(
            AppState::new(),
            vec![AppAction::StartSession, AppAction::SelectArea(ReprogramArea::Spiritual)],
        );
        assert_eq!(state.status, AppStatus::Input);
        assert_eq!(state.form_step, FormStep::Scenario);
        assert_eq!(state.user_input.area, Some(ReprogramArea::Spiritual));

        let state = reduce(state, AppAction::GoToStep(FormStep::Area));
        assert_eq!(state.form_step, FormStep::Area);
    }

    #[test]
    fn test_scenario_step_needs_area() {
        let state = reduce(AppState::new(), AppAction::StartSession);
        let next = reduce(state.clone(), AppAction::GoToStep(FormStep::Scenario));
        assert_eq!(next, state);
    }

    #[test]
    fn test_generation_success_prepends_history() {
        let initial = reduce(
            AppState::new(),
            AppAction::Initialize {
                history: vec![artifact("old")],
                last_selections: LastSelections::default(),
            },
        );
        let mut state = apply(initial, vec![]);
        state = apply(
            state,
            vec![
                AppAction::StartSession,
                AppAction::SelectArea(ReprogramArea::Physical),
                AppAction::SelectScenario(Scenario::new("phys-2", ReprogramArea::Physical, "T", "P")),
                AppAction::StartGeneration,
                AppAction::SetLoadingStep(LoadingStep::Analysis),
            ],
        );
        assert_eq!(state.loading_step, Some(LoadingStep::Analysis));

        let state = reduce(state, AppAction::GenerationSuccess(artifact("new")));
        assert_eq!(state.status, AppStatus::Result);
        assert_eq!(state.history[0].id, "new");
        assert_eq!(state.history[1].id, "old");
        assert_eq!(state.generated.as_ref().unwrap().id, "new");
        assert_eq!(state.last_selections.area_id, Some(ReprogramArea::Physical));
        assert_eq!(state.last_selections.scenario_id.as_deref(), Some("phys-2"));
    }

    #[test]
    fn test_failure_and_retry() {
        let state = reduce(loading_state(), AppAction::GenerationFailure("step 'image'".into()));
        assert_eq!(state.status, AppStatus::Error);
        assert_eq!(state.loading_step, None);

        let state = reduce(state, AppAction::RetryFromError);
        assert_eq!(state.status, AppStatus::Input);
        assert_eq!(state.form_step, FormStep::Scenario);
        assert_eq!(state.error, None);
        assert_eq!(state.user_input.gender, Gender::Female);
    }

    #[test]
    fn test_stale_generation_result_ignored() {
        let state = reduce(loading_state(), AppAction::StartOver);
        let next = reduce(state.clone(), AppAction::GenerationSuccess(artifact("late")));
        assert_eq!(next, state);
        assert!(next.history.is_empty());
    }

    #[test]
    fn test_edit_and_undo_single_level() {
        let state = reduce(loading_state(), AppAction::GenerationSuccess(artifact("a")));
        let original = state.generated.as_ref().unwrap().image.clone();

        let state = apply(
            state,
            vec![
                AppAction::EditImageStart,
                AppAction::EditImageSuccess {
                    image_id: "a".into(),
                    new_image: "edit-1".into(),
                },
                AppAction::EditImageStart,
                AppAction::EditImageSuccess {
                    image_id: "a".into(),
                    new_image: "edit-2".into(),
                },
            ],
        );
        let generated = state.generated.as_ref().unwrap();
        assert_eq!(generated.image, "edit-2");
        assert_eq!(generated.original_image.as_deref(), Some(original.as_str()));
        assert!(state.history[0].is_edited());

        let state = reduce(state, AppAction::UndoImageEdit("a".into()));
        let generated = state.generated.as_ref().unwrap();
        assert_eq!(generated.image, original);
        assert!(!generated.is_edited());
        assert!(!state.history[0].is_edited());

        // Nothing left to undo
        let next = reduce(state.clone(), AppAction::UndoImageEdit("a".into()));
        assert_eq!(next, state);
    }

    #[test]
    fn test_edit_failure_sets_error() {
        let state = reduce(loading_state(), AppAction::GenerationSuccess(artifact("a")));
        let state = apply(
            state,
            vec![AppAction::EditImageStart, AppAction::EditImageFailure("nope".into())],
        );
        assert!(!state.is_editing_image);
        assert_eq!(state.error.as_deref(), Some("nope"));
        assert!(!state.generated.unwrap().is_edited());
    }

    #[test]
    fn test_edit_without_artifact_is_ignored() {
        let state = AppState::new();
        assert_eq!(reduce(state.clone(), AppAction::EditImageStart), state);
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let state = reduce(
            AppState::new(),
            AppAction::Initialize {
                history: vec![artifact("a"), artifact("b")],
                last_selections: LastSelections::default(),
            },
        );
        assert_eq!(reduce(state.clone(), AppAction::DeleteHistoryItem("zzz".into())), state);

        let state = reduce(state, AppAction::DeleteHistoryItem("a".into()));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].id, "b");
    }

    #[test]
    fn test_history_navigation() {
        let item = artifact("h");
        let state = apply(
            AppState::new(),
            vec![AppAction::ViewHistory, AppAction::ViewHistoryItem(item.clone())],
        );
        assert_eq!(state.status, AppStatus::Result);
        assert_eq!(state.current_artifact(), Some(&item));

        let state = reduce(state, AppAction::StartOver);
        assert_eq!(state.status, AppStatus::Welcome);
        assert_eq!(state.viewing_history_item, None);
    }

    #[test]
    fn test_shared_state_dispatch_reports_changes() {
        let shared = SharedAppState::default();
        assert!(shared.dispatch(AppAction::StartSession));
        assert!(!shared.dispatch(AppAction::RetryFromError));
        assert_eq!(shared.status(), AppStatus::Input);
    }
}
