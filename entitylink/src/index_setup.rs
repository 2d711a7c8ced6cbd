//! Text index setup (§4A): turning a record field into an indexed view
//! that the blocking engine can run BM25 queries against.
//!
//! One tantivy `Index` backs each named view. Every view schema carries
//! three fields: `id` (the record id, stored and raw-indexed), `text`
//! (indexed with the view's analyzer, not stored) and an optional
//! `constraint` (stored and raw-indexed, used by strategies that narrow
//! candidates to records sharing some other field's value).

use crate::analyzers::{self, EXACT_ANALYZER, NGRAM_ANALYZER, PHONETIC_ANALYZER};
use crate::config::{AnalyzersConfig, PhoneticAlgorithm};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::schema::{Field, Schema, SchemaBuilder, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{info, instrument};

/// Which analyzer kind a view was built with — determines how query text
/// must be re-analyzed before searching it (§4B strategies 3, 4 and 6 all
/// reuse this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Exact,
    Ngram,
    Phonetic,
}

impl AnalyzerKind {
    pub fn tokenizer_name(self) -> &'static str {
        match self {
            AnalyzerKind::Exact => EXACT_ANALYZER,
            AnalyzerKind::Ngram => NGRAM_ANALYZER,
            AnalyzerKind::Phonetic => PHONETIC_ANALYZER,
        }
    }
}

pub struct ViewFields {
    pub id: Field,
    pub text: Field,
    pub constraint: Option<Field>,
}

/// A live, queryable view: its tantivy handles plus enough metadata to
/// re-analyze query text the same way the indexed text was analyzed.
pub struct View {
    pub name: String,
    pub analyzer: AnalyzerKind,
    pub index: Index,
    pub reader: IndexReader,
    pub fields: ViewFields,
}

/// Tracks which artifacts `initialize` has already created, so a failure
/// midway reports exactly what exists (§7 `Error::Setup.artifacts`).
pub struct IndexSetup {
    base_dir: Option<PathBuf>,
    views: HashMap<String, Arc<View>>,
}

impl IndexSetup {
    /// In-memory setup: views live for the process lifetime only.
    pub fn in_memory() -> Self {
        Self {
            base_dir: None,
            views: HashMap::new(),
        }
    }

    /// Views persist as tantivy segments under `base_dir/<view_name>/`.
    pub fn on_disk(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            views: HashMap::new(),
        }
    }

    pub fn setup_status(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn view(&self, name: &str) -> Option<Arc<View>> {
        self.views.get(name).cloned()
    }

    /// Build the analyzers, then one view per (name, analyzer, field-name)
    /// triple in `views`. Stops at the first failure; `artifacts` in the
    /// returned error lists the view names that were already created.
    #[instrument(skip(self, analyzers_config, views))]
    pub fn initialize(
        &mut self,
        analyzers_config: &AnalyzersConfig,
        views: &[(String, AnalyzerKind, bool)],
    ) -> Result<()> {
        let manager = tantivy::tokenizer::TokenizerManager::default();
        analyzers::register_all(&manager, analyzers_config);

        let mut created = Vec::new();
        for (name, kind, has_constraint) in views {
            match self.create_view(name, *kind, *has_constraint, &manager) {
                Ok(()) => created.push(name.clone()),
                Err(e) => {
                    return Err(Error::Setup {
                        message: format!("failed creating view \"{name}\": {e}"),
                        artifacts: created,
                    });
                }
            }
        }
        info!(views = created.len(), "index setup complete");
        Ok(())
    }

    fn create_view(
        &mut self,
        name: &str,
        analyzer: AnalyzerKind,
        has_constraint: bool,
        manager: &tantivy::tokenizer::TokenizerManager,
    ) -> Result<()> {
        let mut builder: SchemaBuilder = Schema::builder();
        let id_field = builder.add_text_field("id", STRING | STORED);
        let text_options = TEXT.set_indexing_options(
            tantivy::schema::TextFieldIndexing::default()
                .set_tokenizer(analyzer.tokenizer_name())
                .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
        );
        let text_field = builder.add_text_field("text", text_options);
        let constraint_field = if has_constraint {
            Some(builder.add_text_field("constraint", STRING | STORED))
        } else {
            None
        };
        let schema = builder.build();

        let index = match &self.base_dir {
            Some(base) => {
                let dir = base.join(name);
                std::fs::create_dir_all(&dir)?;
                Index::open_or_create(
                    tantivy::directory::MmapDirectory::open(&dir)
                        .map_err(|e| Error::backend(e.to_string()))?,
                    schema,
                )?
            }
            None => Index::create_in_ram(schema),
        };
        index.tokenizers().register(
            analyzer.tokenizer_name(),
            manager
                .get(analyzer.tokenizer_name())
                .expect("analyzer registered in initialize"),
        );

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        self.views.insert(
            name.to_string(),
            Arc::new(View {
                name: name.to_string(),
                analyzer,
                index,
                reader,
                fields: ViewFields {
                    id: id_field,
                    text: text_field,
                    constraint: constraint_field,
                },
            }),
        );
        Ok(())
    }

    pub fn writer_for(&self, name: &str, heap_size_bytes: usize) -> Result<IndexWriter> {
        let view = self
            .views
            .get(name)
            .ok_or_else(|| Error::not_found(format!("view \"{name}\" is not set up")))?;
        Ok(view.index.writer(heap_size_bytes)?)
    }
}

/// Map a config-declared phonetic algorithm onto the analyzer kind it
/// selects; exists so callers that only know the algorithm (not which
/// view name holds it) can still pick the right tokenizer.
pub fn phonetic_analyzer_kind(_algorithm: PhoneticAlgorithm) -> AnalyzerKind {
    AnalyzerKind::Phonetic
}

pub fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("entitylink")
        .join("views")
}
