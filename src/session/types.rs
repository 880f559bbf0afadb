use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level screen of the application
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    #[default]
    Welcome,
    Input,
    Loading,
    Result,
    Error,
    History,
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppStatus::Welcome => write!(f, "Welcome"),
            AppStatus::Input => write!(f, "Input"),
            AppStatus::Loading => write!(f, "Loading"),
            AppStatus::Result => write!(f, "Result"),
            AppStatus::Error => write!(f, "Error"),
            AppStatus::History => write!(f, "History"),
        }
    }
}

/// Step of the intention form
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStep {
    #[default]
    Area,
    Scenario,
}

/// Step reported while an artifact is generated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStep {
    Prompt,
    Image,
    Analysis,
    Affirmation,
}

impl LoadingStep {
    pub const ALL: [LoadingStep; 4] = [
        LoadingStep::Prompt,
        LoadingStep::Image,
        LoadingStep::Analysis,
        LoadingStep::Affirmation,
    ];

    /// Status line shown while the step runs
    pub fn text(&self) -> &'static str {
        match self {
            LoadingStep::Prompt => "Shaping the symbolic concept...",
            LoadingStep::Image => "Creating the visual symbol...",
            LoadingStep::Analysis => "Reading the symbolism...",
            LoadingStep::Affirmation => "Writing your affirmation and narration...",
        }
    }

    /// Loading bar position, in percent
    pub fn progress(&self) -> u8 {
        match self {
            LoadingStep::Prompt => 25,
            LoadingStep::Image => 50,
            LoadingStep::Analysis => 75,
            LoadingStep::Affirmation => 90,
        }
    }
}

impl std::fmt::Display for LoadingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadingStep::Prompt => write!(f, "prompt"),
            LoadingStep::Image => write!(f, "image"),
            LoadingStep::Analysis => write!(f, "analysis"),
            LoadingStep::Affirmation => write!(f, "affirmation"),
        }
    }
}

/// Narration voice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Neutral,
}

/// Life area a session focuses on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReprogramArea {
    Physical,
    Economic,
    Spiritual,
    Energetic,
}

impl ReprogramArea {
    pub const ALL: [ReprogramArea; 4] = [
        ReprogramArea::Physical,
        ReprogramArea::Economic,
        ReprogramArea::Spiritual,
        ReprogramArea::Energetic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReprogramArea::Physical => "Physical",
            ReprogramArea::Economic => "Economic",
            ReprogramArea::Spiritual => "Spiritual",
            ReprogramArea::Energetic => "Energetic",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReprogramArea::Physical => "Health, energy, vitality and bodily wellbeing.",
            ReprogramArea::Economic => "Abundance, prosperity, career and finances.",
            ReprogramArea::Spiritual => "Inner peace, connection, purpose and growth.",
            ReprogramArea::Energetic => "Chakra flow, auric field and emotional release.",
        }
    }

    /// File name of the area's background track
    pub fn music_file(&self) -> &'static str {
        match self {
            ReprogramArea::Physical => "physical.mp3",
            ReprogramArea::Economic => "economic.mp3",
            ReprogramArea::Spiritual => "spiritual.mp3",
            ReprogramArea::Energetic => "energetic.mp3",
        }
    }
}

impl std::fmt::Display for ReprogramArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A guided intention inside an area
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub area: ReprogramArea,
    pub title: String,
    pub prompt: String,
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        area: ReprogramArea,
        title: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            area,
            title: title.into(),
            prompt: prompt.into(),
        }
    }

    /// Scenario for a free-form intention typed by the user
    pub fn custom(area: ReprogramArea, prompt: impl Into<String>) -> Self {
        Self::new("custom", area, "Personal Symbol", prompt)
    }
}

/// Built-in scenarios, three per area
pub fn builtin_scenarios() -> Vec<Scenario> {
    use ReprogramArea::*;
    vec![
        Scenario::new("phys-1", Physical, "Physical release: solar plexus",
            "Human silhouette receiving a turquoise light wave from a living mandala at the solar plexus, fractal patterns dissolving tension, no text"),
        Scenario::new("phys-2", Physical, "Physical release: spine",
            "A spine made of golden-turquoise light surrounded by swirling geometric patterns, energy flowing upward, no text"),
        Scenario::new("phys-3", Physical, "Physical release: muscle renewal",
            "Energy filaments repairing muscle tissue in soothing teal-green light, fractal harmony, no text"),
        Scenario::new("ener-1", Energetic, "Energetic release: chakra flow",
            "Central indigo and emerald mandala emitting rays through aligned chakras, golden circuits between centers, no text"),
        Scenario::new("ener-2", Energetic, "Energetic release: auric field",
            "Silhouette wrapped in a flowing auric field of emerald, violet and gold, particles in a slow spiral, no text"),
        Scenario::new("ener-3", Energetic, "Energetic release: emotional tension",
            "Indigo and white light breaking through a dark energetic knot that dissolves into bright particles, no text"),
        Scenario::new("spir-1", Spiritual, "Spiritual release: portal of clarity",
            "Silver portal of sacred geometry columns under faint stars, small figure stepping into light, no text"),
        Scenario::new("spir-2", Spiritual, "Spiritual release: inner connection",
            "Meditative silhouette with a glowing third-eye mandala, ascending spirals in violet and silver, no text"),
        Scenario::new("spir-3", Spiritual, "Spiritual release: rising awareness",
            "Golden-violet spiral ascending toward a luminous center, beams radiating outward, no text"),
        Scenario::new("econ-1", Economic, "Economic release: tree of abundance",
            "Golden seed growing into a geometric tree, translucent coins turning into glowing leaves, no text"),
        Scenario::new("econ-2", Economic, "Economic release: financial flow",
            "River of clean golden light flowing through interconnected geometric circuits, black-gold palette, no text"),
        Scenario::new("econ-3", Economic, "Economic release: inner wealth",
            "Golden light radiating from inside a silhouette into geometric patterns, calm power, no text"),
    ]
}

/// Built-in scenarios of one area
pub fn scenarios_for(area: ReprogramArea) -> Vec<Scenario> {
    builtin_scenarios()
        .into_iter()
        .filter(|scenario| scenario.area == area)
        .collect()
}

/// Everything one generation produced
///
/// `original_image` holds the image from before the first edit and is cleared
/// again by undo, so at most one level of undo exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Data URL of the symbolic image
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    pub prompt: String,
    pub scenario_title: String,
    pub area: ReprogramArea,
    #[serde(default)]
    pub gender: Gender,
    pub analysis: String,
    pub affirmation: String,
    /// Base64 raw PCM narration, empty when absent
    #[serde(default)]
    pub analysis_audio_data: String,
    /// Base64 compressed music, empty when absent
    #[serde(default)]
    pub background_music_data: String,
}

impl GeneratedArtifact {
    pub fn is_edited(&self) -> bool {
        self.original_image.is_some()
    }

    pub fn has_narration(&self) -> bool {
        !self.analysis_audio_data.is_empty()
    }

    pub fn has_music(&self) -> bool {
        !self.background_music_data.is_empty()
    }
}

impl Default for GeneratedArtifact {
    fn default() -> Self {
        Self {
            id: String::new(),
            timestamp: DateTime::<Utc>::default(),
            image: String::new(),
            original_image: None,
            prompt: String::new(),
            scenario_title: String::new(),
            area: ReprogramArea::Spiritual,
            gender: Gender::Neutral,
            analysis: String::new(),
            affirmation: String::new(),
            analysis_audio_data: String::new(),
            background_music_data: String::new(),
        }
    }
}

/// Selections of the form in progress
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub area: Option<ReprogramArea>,
    pub scenario: Option<Scenario>,
    pub gender: Gender,
}

/// Selections remembered across launches
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSelections {
    pub area_id: Option<ReprogramArea>,
    pub scenario_id: Option<String>,
}

/// Whole application state, owned by the reducer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    pub status: AppStatus,
    pub form_step: FormStep,
    pub user_input: UserInput,
    pub generated: Option<GeneratedArtifact>,
    pub loading_step: Option<LoadingStep>,
    pub error: Option<String>,
    /// Newest first
    pub history: Vec<GeneratedArtifact>,
    pub viewing_history_item: Option<GeneratedArtifact>,
    pub last_selections: LastSelections,
    pub is_editing_image: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact on the result screen: a history item being viewed, else the
    /// latest generation
    pub fn current_artifact(&self) -> Option<&GeneratedArtifact> {
        self.viewing_history_item
            .as_ref()
            .or(self.generated.as_ref())
    }
}

/// Everything that can happen to the application state
#[derive(Clone, Debug, PartialEq)]
pub enum AppAction {
    /// Restore persisted history and last selections
    Initialize {
        history: Vec<GeneratedArtifact>,
        last_selections: LastSelections,
    },
    StartSession,
    SelectArea(ReprogramArea),
    SelectScenario(Scenario),
    SetGender(Gender),
    GoToStep(FormStep),
    StartGeneration,
    SetLoadingStep(LoadingStep),
    GenerationSuccess(GeneratedArtifact),
    GenerationFailure(String),
    RetryFromError,
    ResetSession,
    StartOver,
    ViewHistory,
    ViewHistoryItem(GeneratedArtifact),
    DeleteHistoryItem(String),
    EditImageStart,
    EditImageSuccess { image_id: String, new_image: String },
    EditImageFailure(String),
    UndoImageEdit(String),
}
