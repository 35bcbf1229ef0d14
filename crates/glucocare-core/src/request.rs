use crate::language::Language;
use crate::state::ConversationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Report,
    Chat,
    FoodImage,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Report => "report",
            RequestKind::Chat => "chat",
            RequestKind::FoodImage => "food_image",
        }
    }
}

/// Immutable input to one AI call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    Report {
        source_text: String,
        language: Language,
    },
    Chat {
        message: String,
        context: Option<ConversationContext>,
        language: Language,
    },
    FoodImage {
        image: Vec<u8>,
        mime_type: String,
        language: Language,
    },
}

impl AnalysisRequest {
    pub fn report(source_text: impl Into<String>, language: Language) -> Self {
        AnalysisRequest::Report {
            source_text: source_text.into(),
            language,
        }
    }

    pub fn chat(
        message: impl Into<String>,
        context: Option<ConversationContext>,
        language: Language,
    ) -> Self {
        AnalysisRequest::Chat {
            message: message.into(),
            context,
            language,
        }
    }

    pub fn food_image(image: Vec<u8>, mime_type: impl Into<String>, language: Language) -> Self {
        AnalysisRequest::FoodImage {
            image,
            mime_type: mime_type.into(),
            language,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            AnalysisRequest::Report { .. } => RequestKind::Report,
            AnalysisRequest::Chat { .. } => RequestKind::Chat,
            AnalysisRequest::FoodImage { .. } => RequestKind::FoodImage,
        }
    }

    pub fn language(&self) -> Language {
        match self {
            AnalysisRequest::Report { language, .. }
            | AnalysisRequest::Chat { language, .. }
            | AnalysisRequest::FoodImage { language, .. } => *language,
        }
    }
}
