use crate::core::cache::{CacheStatus, Fingerprint};
use crate::core::graph::Graph;
use crate::core::prompt::{normalize_query, ExtractionPrompt};
use crate::core::repair::repair;
use crate::core::session::ExtractionSession;
use crate::domain::model::SamplingParams;
use crate::domain::ports::{ConfigProvider, TextGenerator};
use crate::utils::error::{ExtractError, Result};

/// 一次擷取的結果；快取命中時 `cost` 為 0
#[derive(Debug, Clone)]
pub struct Extraction {
    pub graph: Graph,
    pub cost: f64,
    pub cache_status: CacheStatus,
    pub fingerprint: Fingerprint,
    pub prompt_resolved: bool,
}

pub struct GraphExtractor<G: TextGenerator> {
    generator: G,
    prompt: ExtractionPrompt,
    sampling: SamplingParams,
}

impl<G: TextGenerator> GraphExtractor<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            prompt: ExtractionPrompt::default(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn from_config<C: ConfigProvider>(generator: G, config: &C) -> Self {
        Self {
            generator,
            prompt: ExtractionPrompt::new(config.prompt_template(), config.detail_level()),
            sampling: config.sampling(),
        }
    }

    pub fn with_prompt(mut self, prompt: ExtractionPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub async fn extract_graph(
        &self,
        session: &ExtractionSession,
        query: &str,
        model_id: &str,
    ) -> Result<Extraction> {
        // 未知模型在呼叫服務前就失敗
        let canonical = session.accountant().price_table().resolve(model_id)?;

        if query.trim().is_empty() {
            return Err(ExtractError::ValidationError {
                message: "Query text must not be empty".to_string(),
            });
        }

        let query = normalize_query(query);
        let rendered = self.prompt.render(&query);
        if !rendered.fully_resolved {
            tracing::warn!("⚠️ Prompt still has unresolved placeholders, sending it as-is");
        }

        let fingerprint = Fingerprint::compute(canonical, &rendered.text);
        tracing::info!(
            "📡 Extracting graph with {} ({} chars of input)",
            model_id,
            query.chars().count()
        );

        let mut spent = 0.0;
        let spent_ref = &mut spent;
        let generator = &self.generator;
        let sampling = &self.sampling;
        let accountant = session.accountant();
        let prompt_text = rendered.text.as_str();

        let (document, cache_status) = session
            .cache()
            .get_or_compute(&fingerprint, session.ttl_seconds(), move || async move {
                let completion = generator.generate(prompt_text, model_id, sampling).await?;
                // 服務已計費，即使後續修補失敗也要入帳
                *spent_ref = accountant.estimate(&completion.usage, model_id)?;
                repair(&completion.raw_output)
            })
            .await?;

        let graph = match Graph::build(&document) {
            Ok(graph) => graph,
            Err(e) => {
                session.cache().invalidate(&fingerprint).await;
                return Err(e);
            }
        };

        tracing::info!(
            "✅ Graph ready: {} nodes, {} edges ({:?}, ${:.4})",
            graph.nodes().len(),
            graph.edges().len(),
            cache_status,
            spent
        );

        Ok(Extraction {
            graph,
            cost: spent,
            cache_status,
            fingerprint,
            prompt_resolved: rendered.fully_resolved,
        })
    }
}
