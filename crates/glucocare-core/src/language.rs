#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Bengali,
    Marathi,
    Tamil,
    Telugu,
    Spanish,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Bengali => "bn",
            Language::Marathi => "mr",
            Language::Tamil => "ta",
            Language::Telugu => "te",
            Language::Spanish => "es",
        }
    }

    /// Accepts either the language code or the English name.
    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .into_iter()
            .find(|lang| lang.code() == wanted || lang.display_name().to_lowercase() == wanted)
    }

    pub fn all() -> Vec<Language> {
        vec![
            Language::English,
            Language::Hindi,
            Language::Bengali,
            Language::Marathi,
            Language::Tamil,
            Language::Telugu,
            Language::Spanish,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Bengali => "Bengali",
            Language::Marathi => "Marathi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Spanish => "Spanish",
        }
    }

    pub fn next(&self) -> Language {
        let all = Self::all();
        let idx = all.iter().position(|l| l == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }
}
