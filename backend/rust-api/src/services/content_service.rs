use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::models::question::{AnswerOption, AuthoredQuestion, NewQuestion, QuestionOrigin};

/// What to ask the generator for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub level: u32,
    pub count: u32,
    /// Ask for a know / understand / apply progression.
    pub triad: bool,
}

impl GenerationRequest {
    pub fn single(topic: impl Into<String>, level: u32) -> Self {
        Self {
            topic: topic.into(),
            level,
            count: 1,
            triad: false,
        }
    }

    pub fn triad(topic: impl Into<String>, level: u32) -> Self {
        Self {
            topic: topic.into(),
            level,
            count: 3,
            triad: true,
        }
    }

    /// Instruction text handed to the generator.
    pub fn prompt(&self) -> String {
        let difficulty = match self.level {
            1 => "Beginner: definitions and basic vocabulary, no calculations.",
            4 => "Expert: complex cases, cost trade-offs, strategy and advanced KPIs.",
            _ => "Intermediate: standard formulas and operational management.",
        };
        let shape = if self.triad {
            "Write 3 progressive multiple-choice questions: 1. know (definition), \
             2. understand (why), 3. apply (practical case)."
        } else {
            "Write 1 multiple-choice question."
        };
        format!(
            "Supply chain module: {topic}. Level {level}/4. {difficulty} {shape} \
             Strict JSON: [{{\"question\":\"...\",\"options\":{{\"A\":\"..\",\"B\":\"..\",\"C\":\"..\",\"D\":\"..\"}},\
             \"correct\":\"A\",\"explanation\":\"...\",\"category\":\"{topic}\",\"concept_key\":\"...\"}}]",
            topic = self.topic,
            level = self.level,
        )
    }
}

/// Generative content source. Returns raw text; parsing is the caller's job
/// so malformed output stays a soft failure.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    prompt: String,
    topic: &'a str,
    level: u32,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    content: String,
}

/// Calls the content service at `{api_url}/internal/generate_questions`.
pub struct HttpContentProvider {
    client: Client,
    api_url: String,
    timeout: Duration,
}

impl HttpContentProvider {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ContentProvider for HttpContentProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/internal/generate_questions", self.api_url);
        let payload = GeneratePayload {
            prompt: request.prompt(),
            topic: &request.topic,
            level: request.level,
            count: request.count,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call content generator")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Content generator returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse content generator response")?;
        Ok(body.content)
    }
}

/// Pull the first JSON array out of generator text and keep the questions
/// that pass ingestion checks. Anything unparseable yields an empty list.
pub fn parse_generated(
    raw: &str,
    request: &GenerationRequest,
    origin: QuestionOrigin,
) -> Vec<NewQuestion> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        warn!(topic = %request.topic, "Generator output has no JSON array");
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let authored: Vec<AuthoredQuestion> = match serde_json::from_str(&raw[start..=end]) {
        Ok(items) => items,
        Err(e) => {
            warn!(topic = %request.topic, error = %e, "Discarding malformed generator output");
            return Vec::new();
        }
    };

    let triad_id = request.triad.then(|| uuid::Uuid::new_v4().to_string());
    authored
        .into_iter()
        .take(request.count.max(1) as usize)
        .enumerate()
        .filter_map(|(index, item)| {
            let mut question = item.into_new_question(request.level, &request.topic, origin);
            question.level = request.level;
            if let Some(triad_id) = &triad_id {
                question.triad_id = Some(triad_id.clone());
                question.triad_position = index as u32 + 1;
            }
            match question.checked() {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!(error = %e, "Generated question rejected");
                    None
                }
            }
        })
        .collect()
}

struct StaticQuestion {
    category: &'static str,
    concept: &'static str,
    prompt: &'static str,
    options: [(&'static str, &'static str); 4],
    correct: &'static str,
    explanation: &'static str,
    theory: &'static str,
    example: &'static str,
    tip: &'static str,
}

const STATIC_LEVEL_1: &[StaticQuestion] = &[
    StaticQuestion {
        category: "Fundamentals",
        concept: "Supply Chain Definition",
        prompt: "What is the fundamental definition of the supply chain?",
        options: [
            ("A", "Transport only"),
            ("B", "Managing physical, information and financial flows"),
            ("C", "Buying at the lowest price"),
            ("D", "Storage"),
        ],
        correct: "B",
        explanation: "It covers every flow from the supplier to the end customer.",
        theory: "The supply chain is a systemic view of the company.",
        example: "Coordinating a plant with its carrier.",
        tip: "Think end-to-end.",
    },
    StaticQuestion {
        category: "Logistics",
        concept: "Lead Time",
        prompt: "Lead time corresponds to:",
        options: [
            ("A", "Transport time"),
            ("B", "The delay between ordering and receiving"),
            ("C", "Storage duration"),
            ("D", "Production time"),
        ],
        correct: "B",
        explanation: "It is the total throughput time of the flow.",
        theory: "A key responsiveness indicator.",
        example: "Ordered Monday, received Thursday: lead time is 3 days.",
        tip: "Shorter lead time frees working capital.",
    },
];

const STATIC_LEVEL_2: &[StaticQuestion] = &[StaticQuestion {
    category: "Inventory",
    concept: "Safety Stock",
    prompt: "When sizing safety stock, which factor matters most?",
    options: [
        ("A", "Product colour"),
        ("B", "Variability of demand and lead time"),
        ("C", "Number of forklift drivers"),
        ("D", "Size of the plant"),
    ],
    correct: "B",
    explanation: "Safety stock covers uncertainty.",
    theory: "Usually derived from the normal distribution (sigma).",
    example: "An unexpected two-day supplier delay.",
    tip: "A 100% service level is economically impossible.",
}];

const STATIC_LEVEL_3: &[StaticQuestion] = &[StaticQuestion {
    category: "Planning",
    concept: "Bullwhip Effect",
    prompt: "What is the bullwhip effect?",
    options: [
        ("A", "An authoritarian management style"),
        ("B", "Variability amplifying upstream"),
        ("C", "Faster flows"),
        ("D", "Lower inventories"),
    ],
    correct: "B",
    explanation: "A small change in customer demand becomes a wave at the supplier.",
    theory: "Caused by a lack of visibility along the chain.",
    example: "Massive overproduction after a local promotion.",
    tip: "Vendor managed inventory is an effective remedy.",
}];

const STATIC_LEVEL_4: &[StaticQuestion] = &[StaticQuestion {
    category: "Lean Strategy",
    concept: "Muda",
    prompt: "In Lean, what does 'Muda' mean?",
    options: [
        ("A", "Standard"),
        ("B", "Waste"),
        ("C", "Speed"),
        ("D", "Quality"),
    ],
    correct: "B",
    explanation: "Anything that adds no value for the customer.",
    theory: "There are seven kinds of muda (TIMWOOD).",
    example: "Waiting two days for an email approval.",
    tip: "Overproduction is the worst muda.",
}];

/// Hard-coded question for a level, the last link of the fallback chain.
pub fn static_fallback(level: u32) -> NewQuestion {
    let pool = match level {
        2 => STATIC_LEVEL_2,
        3 => STATIC_LEVEL_3,
        4 => STATIC_LEVEL_4,
        _ => STATIC_LEVEL_1,
    };
    let chosen = pool.choose(&mut rand::rng()).unwrap_or(&STATIC_LEVEL_1[0]);

    NewQuestion {
        category: chosen.category.to_string(),
        concept: Some(chosen.concept.to_string()),
        level: level.clamp(1, 4),
        prompt: chosen.prompt.to_string(),
        options: chosen
            .options
            .iter()
            .map(|(label, text)| AnswerOption {
                label: label.to_string(),
                text: text.to_string(),
            })
            .collect(),
        correct: chosen.correct.to_string(),
        explanation: chosen.explanation.to_string(),
        theory: Some(chosen.theory.to_string()),
        example: Some(chosen.example.to_string()),
        tip: Some(chosen.tip.to_string()),
        triad_id: None,
        triad_position: 0,
        origin: QuestionOrigin::Fallback,
    }
}
