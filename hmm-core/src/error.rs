//! # Erros do motor HMM
//!
//! Todos os erros são de **validação de entrada local**: formatos de corpus
//! inconsistentes, rótulos fora do conjunto declarado ou observações que não
//! batem com o esquema do modelo. Nenhum deles é recuperado silenciosamente.

use thiserror::Error;

/// Tipo de erro unificado do crate.
#[derive(Debug, Error)]
pub enum HmmError {
    /// Formatos incompatíveis (ex: 3 sequências de observações e 2 de rótulos).
    #[error("dimensões incompatíveis: {0}")]
    DimensionMismatch(String),

    /// Rótulo fora do conjunto de estados declarado no esquema.
    #[error("estado desconhecido: '{0}'")]
    UnknownStateLabel(String),

    /// Observação referencia uma feature não declarada no esquema.
    #[error("feature desconhecida: '{0}'")]
    UnknownFeature(String),

    /// Valor discreto fora de `[0, num_vals)`.
    #[error("valor {value} inválido para a feature discreta '{feature}' (esperado 0..{num_vals})")]
    InvalidDiscreteValue {
        feature: String,
        value: i64,
        num_vals: usize,
    },

    /// Valor contínuo em feature discreta (ou o contrário).
    #[error("tipo de valor incompatível com a feature '{0}'")]
    FeatureKindMismatch(String),

    /// Sequência de comprimento zero.
    #[error("sequência vazia")]
    EmptySequence,

    /// Corpus de treino sem nenhuma sequência.
    #[error("corpus de treino vazio")]
    EmptyTrainingSet,

    /// Esquema mal formado (sem estados, nomes duplicados, `num_vals == 0`).
    #[error("esquema inválido: {0}")]
    InvalidSchema(String),

    /// Tabelas de probabilidade que não batem com o esquema.
    #[error("modelo inválido: {0}")]
    InvalidModel(String),

    /// Falha ao (de)serializar o modelo.
    #[error("erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias usado em todo o crate.
pub type Result<T> = std::result::Result<T, HmmError>;
