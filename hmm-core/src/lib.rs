//! # hmm-core — Rotulação de Traços com Hidden Markov Models
//!
//! Este crate rotula uma sequência temporal de traços desenhados à mão (cada
//! traço já reduzido a um vetor de features) com a sequência de estados ocultos
//! mais provável, por exemplo `drawing` vs. `text` em esboços de circuitos.
//!
//! ## Arquitetura
//!
//! Duas fases independentes e sequenciais:
//!
//! 1.  **Treino** ([`estimator`]): a partir de sequências totalmente rotuladas,
//!     estima priors, transições e emissões por máxima verossimilhança com
//!     suavização aditiva → produz um [`HmmModel`] imutável.
//! 2.  **Decodificação** ([`viterbi`]): dado o modelo e uma nova sequência,
//!     encontra o caminho de estados mais provável (log-space, `O(T·K²)`).
//!
//! Em volta delas:
//!
//! - [`schema`]: estados e features declarados (validados uma única vez).
//! - [`observation`]: valores observados de cada traço.
//! - [`model`]: as tabelas de parâmetros e a persistência em JSON.
//! - [`evaluate`]: tabela de confusão e acurácia.
//! - [`corpus`]: esquema de traços, corpus sintético e o exemplo do clima.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use hmm_core::corpus::{demo_stroke_corpus, stroke_schema};
//! use hmm_core::{label, train};
//!
//! // 1. Treina com o corpus anotado
//! let schema = stroke_schema();
//! let (observations, labels) = demo_stroke_corpus();
//! let model = train(&schema, &observations, &labels).unwrap();
//!
//! // 2. Rotula uma sequência nova
//! let labeled = label(&model, &observations[0]).unwrap();
//! assert_eq!(labeled.len(), observations[0].len());
//! ```
//!
//! Extração de features geométricas, leitura/escrita de esboços em XML e a
//! escolha dos limiares de discretização ficam fora deste crate.

pub mod corpus;
pub mod error;
pub mod estimator;
pub mod evaluate;
pub mod model;
pub mod observation;
pub mod schema;
pub mod viterbi;

pub use error::{HmmError, Result};
pub use estimator::{train, ParameterEstimator, TrainingSummary};
pub use evaluate::{validate, ConfusionMatrix};
pub use model::{Emission, HmmModel};
pub use observation::{FeatureValue, Observation};
pub use schema::{FeatureId, FeatureKind, FeatureSpec, ModelSchema, StateId};
pub use viterbi::{decode, label, label_batch, ViterbiDecoder, ViterbiResult, ViterbiStep};
