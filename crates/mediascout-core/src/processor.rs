//! Post-processing steps applied to a record after a successful lookup.

use std::sync::Arc;

use thiserror::Error;

use crate::BoxFuture;
use crate::model::AvMeta;
use crate::translator::Translator;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{0}")]
    Other(String),
}

pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn process<'a>(&'a self, meta: &'a mut AvMeta) -> BoxFuture<'a, Result<(), ProcessError>>;
}

/// Run `processors` in order. A failing processor is logged and skipped;
/// the names of the ones that failed are returned.
pub async fn run_processors(processors: &[Arc<dyn Processor>], meta: &mut AvMeta) -> Vec<String> {
    let mut failed = Vec::new();
    for processor in processors {
        if let Err(e) = processor.process(meta).await {
            tracing::warn!(processor = processor.name(), number = %meta.number, error = %e, "processor failed");
            failed.push(processor.name().to_string());
        }
    }
    failed
}

/// Fills `ext_info.translate_info.data` for whichever fields the record's
/// translate options enable. Translation failures leave the field empty.
pub struct TranslateProcessor {
    translator: Arc<dyn Translator>,
    source_lang: String,
    target_lang: String,
}

impl TranslateProcessor {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            source_lang: "auto".to_string(),
            target_lang: "zh".to_string(),
        }
    }

    pub fn with_languages(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_lang = source.into();
        self.target_lang = target.into();
        self
    }

    async fn translate_field(&self, field: &str, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        match self
            .translator
            .translate(text, &self.source_lang, &self.target_lang)
            .await
        {
            Ok(translated) => translated,
            Err(e) => {
                tracing::warn!(field, error = %e, "translation failed");
                String::new()
            }
        }
    }
}

impl Processor for TranslateProcessor {
    fn name(&self) -> &str {
        "translate"
    }

    fn process<'a>(&'a self, meta: &'a mut AvMeta) -> BoxFuture<'a, Result<(), ProcessError>> {
        Box::pin(async move {
            let option = meta.ext_info.translate_info.option;
            if option.enable_title_translate {
                let translated = self.translate_field("title", &meta.title).await;
                meta.ext_info.translate_info.data.translated_title = translated;
            }
            if option.enable_plot_translate {
                let translated = self.translate_field("plot", &meta.plot).await;
                meta.ext_info.translate_info.data.translated_plot = translated;
            }
            Ok(())
        })
    }
}
