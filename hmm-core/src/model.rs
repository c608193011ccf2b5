//! # Modelo HMM Treinado
//!
//! O [`HmmModel`] é um **valor imutável**: contém o esquema e as três tabelas
//! de parâmetros, todas indexadas pela ordem declarada dos estados/features.
//!
//! | Tabela        | Forma          | Significado                        |
//! |---------------|----------------|------------------------------------|
//! | `priors`      | `[K]`          | $P(y_0 = s)$                       |
//! | `transitions` | `[K][K]`       | $P(y_t = s_2 \mid y_{t-1} = s_1)$  |
//! | `emissions`   | `[K][F]`       | $P(x_f \mid y = s)$ por feature    |
//!
//! As probabilidades ficam em **espaço linear** (como foram estimadas); o
//! Viterbi converte para log-space no momento da decodificação.
//!
//! O modelo nunca é alterado depois de construído: retreinar produz um modelo
//! novo. Isso permite compartilhar `&HmmModel` (ou `Arc<HmmModel>`) entre
//! threads sem nenhuma sincronização.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::observation::{EncodedObservation, EncodedValue};
use crate::schema::{FeatureId, FeatureKind, ModelSchema, StateId};

/// Distribuição de emissão de uma feature, para um estado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Emission {
    /// Lista de `num_vals` probabilidades (uma por categoria).
    Discrete { probs: Vec<f64> },
    /// Gaussiana parametrizada por média e desvio padrão.
    Gaussian { mean: f64, std_dev: f64 },
}

impl Emission {
    /// Log-verossimilhança de um valor já validado.
    ///
    /// Calculada direto em log-space: uma Gaussiana avaliada a dezenas de
    /// desvios da média ainda dá um valor finito e comparável.
    pub(crate) fn log_likelihood(&self, value: EncodedValue) -> f64 {
        match (self, value) {
            (Emission::Discrete { probs }, EncodedValue::Discrete(v)) => probs[v].ln(),
            (Emission::Gaussian { mean, std_dev }, EncodedValue::Continuous(x)) => {
                gaussian_log_density(x, *mean, *std_dev)
            }
            // `from_parts` casa cada emissão com o tipo declarado da feature e
            // `encode_observation` faz o mesmo com cada valor
            (emission, value) => unreachable!(
                "emissão {emission:?} incompatível com o valor {value:?}"
            ),
        }
    }
}

/// Densidade normal $\frac{1}{\sigma\sqrt{2\pi}} e^{-(x-\mu)^2 / 2\sigma^2}$.
///
/// Com `std_dev <= 0` (todas as amostras de treino iguais) a distribuição
/// degenera numa massa pontual: 1 em `x == mean`, 0 no resto.
pub fn gaussian_density(x: f64, mean: f64, std_dev: f64) -> f64 {
    gaussian_log_density(x, mean, std_dev).exp()
}

/// $\ln$ da densidade normal: $-\frac{(x-\mu)^2}{2\sigma^2} - \ln(\sigma\sqrt{2\pi})$.
///
/// A massa pontual de `std_dev <= 0` vira `0` em `x == mean` e `-inf` no resto.
pub fn gaussian_log_density(x: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return if x == mean { 0.0 } else { f64::NEG_INFINITY };
    }
    let z = (x - mean) / std_dev;
    -0.5 * z * z - (std_dev * (2.0 * PI).sqrt()).ln()
}

/// HMM treinado (ou montado à mão) pronto para decodificação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelDef")]
pub struct HmmModel {
    schema: ModelSchema,
    priors: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    emissions: Vec<Vec<Emission>>,
}

#[derive(Deserialize)]
struct ModelDef {
    schema: ModelSchema,
    priors: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    emissions: Vec<Vec<Emission>>,
}

impl TryFrom<ModelDef> for HmmModel {
    type Error = HmmError;

    fn try_from(def: ModelDef) -> Result<Self> {
        HmmModel::from_parts(def.schema, def.priors, def.transitions, def.emissions)
    }
}

impl HmmModel {
    /// Monta um modelo a partir de tabelas já calculadas.
    ///
    /// Usado pelo estimador e por quem quer fixar parâmetros à mão (ex: o
    /// exemplo do clima em [`crate::corpus::weather_model`]). Só a **forma** das
    /// tabelas é validada: um modelo manual pode ter probabilidades zero, e o
    /// Viterbi lida com `-inf` sem problemas.
    ///
    /// # Erros
    /// [`HmmError::InvalidModel`] se alguma dimensão não bate com o esquema, ou
    /// se o tipo de uma emissão não corresponde ao tipo declarado da feature.
    pub fn from_parts(
        schema: ModelSchema,
        priors: Vec<f64>,
        transitions: Vec<Vec<f64>>,
        emissions: Vec<Vec<Emission>>,
    ) -> Result<Self> {
        let k = schema.num_states();

        if priors.len() != k {
            return Err(HmmError::InvalidModel(format!(
                "{} priors para {k} estados",
                priors.len()
            )));
        }
        if transitions.len() != k || transitions.iter().any(|row| row.len() != k) {
            return Err(HmmError::InvalidModel(format!(
                "a matriz de transição deve ser {k}x{k}"
            )));
        }
        if emissions.len() != k {
            return Err(HmmError::InvalidModel(format!(
                "{} linhas de emissão para {k} estados",
                emissions.len()
            )));
        }

        for (s, row) in emissions.iter().enumerate() {
            if row.len() != schema.num_features() {
                return Err(HmmError::InvalidModel(format!(
                    "estado '{}' tem {} emissões para {} features",
                    schema.state_name(StateId(s)),
                    row.len(),
                    schema.num_features()
                )));
            }
            for (spec, emission) in schema.features().iter().zip(row) {
                let ok = match (spec.kind, emission) {
                    (FeatureKind::Discrete { num_vals }, Emission::Discrete { probs }) => {
                        probs.len() == num_vals
                    }
                    (FeatureKind::Continuous, Emission::Gaussian { .. }) => true,
                    _ => false,
                };
                if !ok {
                    return Err(HmmError::InvalidModel(format!(
                        "emissão de '{}' no estado '{}' não corresponde à declaração da feature",
                        spec.name,
                        schema.state_name(StateId(s))
                    )));
                }
            }
        }

        Ok(Self {
            schema,
            priors,
            transitions,
            emissions,
        })
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn transitions(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn emissions(&self) -> &[Vec<Emission>] {
        &self.emissions
    }

    pub fn prior(&self, state: StateId) -> f64 {
        self.priors[state.0]
    }

    pub fn transition(&self, from: StateId, to: StateId) -> f64 {
        self.transitions[from.0][to.0]
    }

    pub fn emission(&self, state: StateId, feature: FeatureId) -> &Emission {
        &self.emissions[state.0][feature.0]
    }

    /// $P(y_0 = s)$ pelo nome do estado.
    pub fn prior_of(&self, state: &str) -> Result<f64> {
        Ok(self.prior(self.schema.state_id(state)?))
    }

    /// $P(to \mid from)$ pelos nomes dos estados.
    pub fn transition_of(&self, from: &str, to: &str) -> Result<f64> {
        Ok(self.transition(self.schema.state_id(from)?, self.schema.state_id(to)?))
    }

    /// Distribuição de emissão pelos nomes de estado e feature.
    pub fn emission_of(&self, state: &str, feature: &str) -> Result<&Emission> {
        Ok(self.emission(self.schema.state_id(state)?, self.schema.feature_id(feature)?))
    }

    /// $\log P(x \mid y = s)$ assumindo features independentes dado o estado
    /// (fatoração "naive Bayes"): soma dos logs de cada feature presente.
    pub(crate) fn log_emission(&self, state: StateId, observation: &EncodedObservation) -> f64 {
        observation
            .values
            .iter()
            .map(|&(feature, value)| self.emission(state, feature).log_likelihood(value))
            .sum()
    }

    /// Serializa o modelo completo (esquema + tabelas) em JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reconstrói um modelo a partir de JSON, revalidando as dimensões.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
