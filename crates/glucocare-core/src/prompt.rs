use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::ai::gemini::{GenerateRequest, GenerationConfig, InlineData, Part};
use crate::error::{Error, Result};
use crate::language::Language;
use crate::request::AnalysisRequest;
use crate::state::{truncate_chars, ConversationContext};

/// Shorter OCR output than this is rejected without calling the provider.
pub const MIN_REPORT_TEXT: usize = 5;

/// Report context embedded in a chat prompt, in characters.
pub const CHAT_CONTEXT_CHARS: usize = 1000;

pub const CHAT_WORD_LIMIT: usize = 80;

/// Section headings of the report skeleton, in order.
pub const REPORT_SECTIONS: [&str; 5] = [
    "Risk Assessment",
    "Key Findings",
    "Diet Plan",
    "Exercise Plan",
    "Medical Advice",
];

const SECTION_STYLE: [(&str, &str); 5] = [
    ("#d9534f", "🚨"),
    ("#f0ad4e", "🔬"),
    ("#0275d8", "🥗"),
    ("#5cb85c", "💪"),
    ("#6f42c1", "🩺"),
];

const SECTION_BODY: [&str; 5] = [
    "<p>[Overall risk level (Low, Moderate or High) and a short summary of the patient's status]</p>",
    "<ul>\n    <li>[Marker: reported value, normal range, what it means]</li>\n  </ul>",
    "<ul>\n    <li>[Specific food advice]</li>\n  </ul>",
    "<ul>\n    <li>[Exercise advice]</li>\n  </ul>",
    "<p>[When to see a doctor and which follow-up tests to ask for]</p>",
];

/// Common OCR misreads in lab reports and what they should be read as.
const OCR_CORRECTIONS: [(&str, &str); 7] = [
    ("mg/dI, mg/d1, mgdl, mg/di", "mg/dL"),
    ("mmol/I, mmol/1", "mmol/L"),
    ("HbAlc, HbAIc, HBA1C, Hb A1 c", "HbA1c"),
    ("Gluc0se, Glucos e, GIucose", "Glucose"),
    ("letter O or o inside a number", "digit 0"),
    ("letter l or I inside a number", "digit 1"),
    ("a stray 9 or 96 after an HbA1c value", "%"),
];

pub struct PromptBuilder {
    generation: GenerationConfig,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(GenerationConfig::default())
    }
}

impl PromptBuilder {
    pub fn new(generation: GenerationConfig) -> Self {
        Self { generation }
    }

    /// Validate and build the provider payload for any request kind.
    pub fn build(&self, request: &AnalysisRequest) -> Result<GenerateRequest> {
        match request {
            AnalysisRequest::Report { source_text, language } => {
                self.report(source_text, *language)
            }
            AnalysisRequest::Chat { message, context, language } => {
                self.chat(message, context.as_ref(), *language)
            }
            AnalysisRequest::FoodImage { image, mime_type, language } => {
                self.food(image, mime_type, *language)
            }
        }
    }

    pub fn report(&self, source_text: &str, language: Language) -> Result<GenerateRequest> {
        let text = source_text.trim();
        if text.chars().count() < MIN_REPORT_TEXT {
            return Err(Error::invalid(
                "Could not read enough text from the report. Try a clearer image.",
            ));
        }

        let mut prompt = String::new();
        prompt.push_str("You are GlucoCare AI, an expert endocrinologist reviewing a blood test report.\n");
        prompt.push_str("The text below was extracted from a scanned report by OCR and may contain recognition errors.\n\n");

        prompt.push_str("Report text:\n\"\"\"\n");
        prompt.push_str(text);
        prompt.push_str("\n\"\"\"\n\n");

        prompt.push_str("Instructions:\n");
        prompt.push_str("1. Identify every value relevant to diabetes care: fasting, random and post-meal glucose, HbA1c, ");
        prompt.push_str("lipid profile, kidney markers and urine sugar. Quote each value with its unit.\n");
        prompt.push_str("2. Correct obvious OCR mistakes before interpreting the numbers:\n");
        for (seen, meant) in OCR_CORRECTIONS {
            prompt.push_str(&format!("   - {} -> {}\n", seen, meant));
        }
        prompt.push_str("3. Assess the overall diabetes risk as Low, Moderate or High.\n");
        prompt.push_str(&format!("4. Write the whole answer in {}.\n", language.display_name()));
        prompt.push_str("5. Output plain HTML only, using exactly this structure. Do not use markdown and do not wrap the answer in code fences.\n\n");
        prompt.push_str(&report_skeleton());

        Ok(GenerateRequest::new(vec![Part::Text { text: prompt }], self.generation))
    }

    pub fn chat(
        &self,
        message: &str,
        context: Option<&ConversationContext>,
        language: Language,
    ) -> Result<GenerateRequest> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::invalid("Please type a question first."));
        }

        let mut prompt = String::new();
        prompt.push_str("You are GlucoCare AI, a medical assistant for people managing diabetes.\n");

        if let Some(ctx) = context {
            let excerpt = truncate_chars(ctx.excerpt(), CHAT_CONTEXT_CHARS);
            prompt.push_str("Context: the user's blood report text: \"");
            prompt.push_str(excerpt);
            if excerpt.len() < ctx.excerpt().len() {
                prompt.push_str("...");
            }
            prompt.push_str("\"\n");
        }

        prompt.push_str(&format!("User asks: \"{}\"\n", message));
        prompt.push_str(&format!(
            "Answer in {} and keep it short (under {} words). Reply with plain HTML (a <p> or a short <ul>), no markdown.",
            language.display_name(),
            CHAT_WORD_LIMIT
        ));

        Ok(GenerateRequest::new(vec![Part::Text { text: prompt }], self.generation))
    }

    pub fn food(&self, image: &[u8], mime_type: &str, language: Language) -> Result<GenerateRequest> {
        if image.is_empty() {
            return Err(Error::invalid("Please choose a food photo first."));
        }

        let mut prompt = String::new();
        prompt.push_str("You are GlucoCare AI, an expert dietitian for people with diabetes.\n");
        prompt.push_str("Look at the attached photo and:\n");
        prompt.push_str("1. Identify each food item on the plate.\n");
        prompt.push_str("2. Estimate total carbohydrates in grams, the glycemic index (Low, Medium or High) and the sugar load.\n");
        prompt.push_str("3. Give one verdict for a diabetic: Safe, Moderate, or Avoid.\n");
        prompt.push_str(&format!("Write the answer in {}.\n", language.display_name()));
        prompt.push_str("Output plain HTML only, no markdown and no code fences:\n\n");
        prompt.push_str("<div>\n");
        prompt.push_str("  <h3 style=\"margin:0;\">🍽️ [Food name]</h3>\n");
        prompt.push_str("  <p><strong>Verdict:</strong> [Safe / Moderate / Avoid]</p>\n");
        prompt.push_str("  <ul>\n");
        prompt.push_str("    <li><strong>Carbs:</strong> [grams]</li>\n");
        prompt.push_str("    <li><strong>GI Score:</strong> [Low / Medium / High]</li>\n");
        prompt.push_str("    <li><strong>Sugar Load:</strong> [Low / Medium / High]</li>\n");
        prompt.push_str("    <li><strong>Advice:</strong> [one sentence tip]</li>\n");
        prompt.push_str("  </ul>\n");
        prompt.push_str("</div>\n");

        let image_part = Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(image),
            },
        };

        Ok(GenerateRequest::new(
            vec![Part::Text { text: prompt }, image_part],
            self.generation,
        ))
    }
}

/// The fixed HTML layout the report answer must follow.
pub fn report_skeleton() -> String {
    let mut html = String::from("<div>\n");
    for ((title, (color, icon)), body) in REPORT_SECTIONS.iter().zip(SECTION_STYLE).zip(SECTION_BODY) {
        html.push_str(&format!("  <h3 style=\"color:{}\">{} {}</h3>\n", color, icon, title));
        html.push_str(&format!("  {}\n", body));
    }
    html.push_str("</div>\n");
    html
}
