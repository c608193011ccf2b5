//! # Estimação de Parâmetros (MLE com Suavização Aditiva)
//!
//! O treino é **supervisionado**: cada sequência de observações vem com a
//! sequência de rótulos correta, então basta contar.
//!
//! ## Priors
//!
//! ```text
//! prior(s) = max(1, #sequências que começam em s) / #sequências
//! ```
//!
//! ## Transições
//!
//! ```text
//! trans(s, s2) = max(1, count[s][s2]) / Σ_x count[s][x]
//! ```
//!
//! O piso `max(1, ·)` evita probabilidades zero, mas **não renormaliza**: se
//! algum par nunca foi visto, a linha soma um pouco mais que 1. Esse desvio é
//! mantido de propósito porque os valores numéricos esperados dependem dele.
//! Um estado que nunca aparece como origem de transição (linha toda zero)
//! recebe a distribuição uniforme `1/K`.
//!
//! ## Emissões
//!
//! - **Discreta**: contagens iniciam em 1 (add-one), `+1` por ocorrência, e
//!   cada categoria é dividida por `n_observações + num_vals` → soma exata 1.
//! - **Contínua**: média amostral e desvio padrão **populacional** (divide por
//!   `n`, não `n - 1`). Sem nenhuma amostra, usa `N(0, 1)` como placeholder.
//!
//! Este módulo não faz I/O nem logging: é uma função pura do corpus.

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::model::{Emission, HmmModel};
use crate::observation::{encode_sequence, EncodedObservation, EncodedValue, Observation};
use crate::schema::{FeatureKind, ModelSchema, StateId};

/// Estatísticas do corpus usado no treino (para exibição e logs do chamador).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub num_sequences: usize,
    pub num_observations: usize,
    /// Quantas posições de cada estado (ordem declarada).
    pub state_counts: Vec<usize>,
}

/// Estimador de máxima verossimilhança para um esquema fixo.
pub struct ParameterEstimator<'a> {
    schema: &'a ModelSchema,
}

impl<'a> ParameterEstimator<'a> {
    pub fn new(schema: &'a ModelSchema) -> Self {
        Self { schema }
    }

    /// Treina o modelo completo: priors, transições e emissões.
    ///
    /// # Erros
    /// - [`HmmError::DimensionMismatch`]: número de sequências diferente entre
    ///   observações e rótulos, ou um par de sequências com comprimentos diferentes.
    /// - [`HmmError::EmptyTrainingSet`]: nenhuma sequência.
    /// - [`HmmError::EmptySequence`]: uma sequência de treino vazia.
    /// - [`HmmError::UnknownStateLabel`]: rótulo fora dos estados declarados.
    /// - [`HmmError::UnknownFeature`] / [`HmmError::InvalidDiscreteValue`] /
    ///   [`HmmError::FeatureKindMismatch`]: observação mal formada.
    pub fn fit<S: AsRef<str>>(
        &self,
        observations: &[Vec<Observation>],
        labels: &[Vec<S>],
    ) -> Result<HmmModel> {
        Ok(self.fit_with_summary(observations, labels)?.0)
    }

    /// Como [`Self::fit`], devolvendo também as contagens do corpus.
    ///
    /// O corpus é validado e codificado uma única vez.
    pub fn fit_with_summary<S: AsRef<str>>(
        &self,
        observations: &[Vec<Observation>],
        labels: &[Vec<S>],
    ) -> Result<(HmmModel, TrainingSummary)> {
        let (encoded_obs, encoded_labels) = self.encode_corpus(observations, labels)?;

        let priors = prior_table(self.schema.num_states(), &encoded_labels);
        let transitions = transition_table(self.schema.num_states(), &encoded_labels);
        let emissions = self.emission_table(&encoded_obs, &encoded_labels);
        let summary = summary_of(self.schema.num_states(), &encoded_labels);

        let model = HmmModel::from_parts(self.schema.clone(), priors, transitions, emissions)?;
        Ok((model, summary))
    }

    /// Contagens básicas do corpus, com a mesma validação de [`Self::fit`].
    pub fn summarize<S: AsRef<str>>(
        &self,
        observations: &[Vec<Observation>],
        labels: &[Vec<S>],
    ) -> Result<TrainingSummary> {
        let (_, encoded_labels) = self.encode_corpus(observations, labels)?;
        Ok(summary_of(self.schema.num_states(), &encoded_labels))
    }

    /// Probabilidades iniciais, na ordem declarada dos estados.
    pub fn estimate_priors<S: AsRef<str>>(&self, labels: &[Vec<S>]) -> Result<Vec<f64>> {
        let encoded = self.encode_label_corpus(labels)?;
        Ok(prior_table(self.schema.num_states(), &encoded))
    }

    /// Matriz de transição `[origem][destino]`.
    pub fn estimate_transitions<S: AsRef<str>>(&self, labels: &[Vec<S>]) -> Result<Vec<Vec<f64>>> {
        let encoded = self.encode_label_corpus(labels)?;
        Ok(transition_table(self.schema.num_states(), &encoded))
    }

    /// Tabela de emissões `[estado][feature]`.
    pub fn estimate_emissions<S: AsRef<str>>(
        &self,
        observations: &[Vec<Observation>],
        labels: &[Vec<S>],
    ) -> Result<Vec<Vec<Emission>>> {
        let (encoded_obs, encoded_labels) = self.encode_corpus(observations, labels)?;
        Ok(self.emission_table(&encoded_obs, &encoded_labels))
    }

    /// Valida formas e converte o corpus inteiro antes de qualquer contagem.
    fn encode_corpus<S: AsRef<str>>(
        &self,
        observations: &[Vec<Observation>],
        labels: &[Vec<S>],
    ) -> Result<(Vec<Vec<EncodedObservation>>, Vec<Vec<StateId>>)> {
        if observations.len() != labels.len() {
            return Err(HmmError::DimensionMismatch(format!(
                "{} sequências de observações para {} sequências de rótulos",
                observations.len(),
                labels.len()
            )));
        }
        for (i, (obs, labs)) in observations.iter().zip(labels).enumerate() {
            if obs.len() != labs.len() {
                return Err(HmmError::DimensionMismatch(format!(
                    "sequência {i}: {} observações para {} rótulos",
                    obs.len(),
                    labs.len()
                )));
            }
        }

        let encoded_labels = self.encode_label_corpus(labels)?;
        let encoded_obs = observations
            .iter()
            .map(|seq| encode_sequence(self.schema, seq))
            .collect::<Result<Vec<_>>>()?;

        Ok((encoded_obs, encoded_labels))
    }

    fn encode_label_corpus<S: AsRef<str>>(&self, labels: &[Vec<S>]) -> Result<Vec<Vec<StateId>>> {
        if labels.is_empty() {
            return Err(HmmError::EmptyTrainingSet);
        }
        labels
            .iter()
            .map(|seq| {
                if seq.is_empty() {
                    return Err(HmmError::EmptySequence);
                }
                self.schema.encode_labels(seq)
            })
            .collect()
    }

    fn emission_table(
        &self,
        observations: &[Vec<EncodedObservation>],
        labels: &[Vec<StateId>],
    ) -> Vec<Vec<Emission>> {
        let k = self.schema.num_states();
        let f = self.schema.num_features();

        // values[estado][feature] = todos os valores vistos
        let mut values: Vec<Vec<Vec<EncodedValue>>> = vec![vec![Vec::new(); f]; k];
        for (seq, labs) in observations.iter().zip(labels) {
            for (obs, &state) in seq.iter().zip(labs) {
                for &(feature, value) in &obs.values {
                    values[state.0][feature.0].push(value);
                }
            }
        }

        values
            .iter()
            .map(|per_feature| {
                self.schema
                    .features()
                    .iter()
                    .zip(per_feature)
                    .map(|(spec, seen)| match spec.kind {
                        FeatureKind::Discrete { num_vals } => discrete_emission(num_vals, seen),
                        FeatureKind::Continuous => gaussian_emission(seen),
                    })
                    .collect()
            })
            .collect()
    }
}

/// Atalho para `ParameterEstimator::new(schema).fit(observations, labels)`.
pub fn train<S: AsRef<str>>(
    schema: &ModelSchema,
    observations: &[Vec<Observation>],
    labels: &[Vec<S>],
) -> Result<HmmModel> {
    ParameterEstimator::new(schema).fit(observations, labels)
}

fn summary_of(num_states: usize, labels: &[Vec<StateId>]) -> TrainingSummary {
    let mut state_counts = vec![0usize; num_states];
    for &s in labels.iter().flatten() {
        state_counts[s.0] += 1;
    }
    TrainingSummary {
        num_sequences: labels.len(),
        num_observations: state_counts.iter().sum(),
        state_counts,
    }
}

fn prior_table(num_states: usize, labels: &[Vec<StateId>]) -> Vec<f64> {
    let mut counts = vec![0usize; num_states];
    for seq in labels {
        if let Some(first) = seq.first() {
            counts[first.0] += 1;
        }
    }

    let total = labels.len() as f64;
    counts
        .iter()
        .map(|&c| (c.max(1) as f64) / total)
        .collect()
}

fn transition_table(num_states: usize, labels: &[Vec<StateId>]) -> Vec<Vec<f64>> {
    // Todas as contagens começam em zero, inclusive para estados nunca vistos
    let mut counts = vec![vec![0usize; num_states]; num_states];
    for seq in labels {
        for pair in seq.windows(2) {
            counts[pair[0].0][pair[1].0] += 1;
        }
    }

    counts
        .iter()
        .map(|row| {
            let total: usize = row.iter().sum();
            if total == 0 {
                return vec![1.0 / num_states as f64; num_states];
            }
            row.iter()
                .map(|&c| (c.max(1) as f64) / total as f64)
                .collect()
        })
        .collect()
}

fn discrete_emission(num_vals: usize, seen: &[EncodedValue]) -> Emission {
    let mut counts = vec![1.0f64; num_vals];
    for value in seen {
        if let EncodedValue::Discrete(v) = *value {
            counts[v] += 1.0;
        }
    }

    let denom = (seen.len() + num_vals) as f64;
    Emission::Discrete {
        probs: counts.into_iter().map(|c| c / denom).collect(),
    }
}

fn gaussian_emission(seen: &[EncodedValue]) -> Emission {
    let xs: Vec<f64> = seen
        .iter()
        .filter_map(|v| match *v {
            EncodedValue::Continuous(x) => Some(x),
            EncodedValue::Discrete(_) => None,
        })
        .collect();

    if xs.is_empty() {
        return Emission::Gaussian {
            mean: 0.0,
            std_dev: 1.0,
        };
    }

    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Emission::Gaussian {
        mean,
        std_dev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSpec;

    fn schema() -> ModelSchema {
        ModelSchema::new(
            vec!["drawing", "text"],
            vec![
                FeatureSpec::discrete("length", 2),
                FeatureSpec::continuous("curvature"),
            ],
        )
        .unwrap()
    }

    fn obs(length: i64, curvature: f64) -> Observation {
        Observation::new().with("length", length).with("curvature", curvature)
    }

    fn corpus() -> (Vec<Vec<Observation>>, Vec<Vec<&'static str>>) {
        let observations = vec![
            vec![obs(1, 0.5), obs(1, 1.5), obs(0, 3.0)],
            vec![obs(0, 2.0), obs(1, 1.0)],
            vec![obs(1, 1.0), obs(0, 4.0), obs(0, 5.0), obs(1, 2.0)],
        ];
        let labels = vec![
            vec!["drawing", "drawing", "text"],
            vec!["text", "drawing"],
            vec!["drawing", "text", "text", "drawing"],
        ];
        (observations, labels)
    }

    #[test]
    fn test_priors_with_floor() {
        let (_, labels) = corpus();
        let priors = ParameterEstimator::new(&schema()).estimate_priors(&labels).unwrap();

        // 2 de 3 começam em drawing, 1 de 3 em text
        assert!((priors[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((priors[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((priors.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_prior_floor_is_not_renormalized() {
        // "text" nunca inicia uma sequência: recebe 1/N e a soma passa de 1
        let labels = vec![vec!["drawing"], vec!["drawing"], vec!["drawing", "text"]];
        let priors = ParameterEstimator::new(&schema()).estimate_priors(&labels).unwrap();

        assert!((priors[0] - 1.0).abs() < 1e-12);
        assert!((priors[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((priors.iter().sum::<f64>() - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_transitions_counts() {
        let (_, labels) = corpus();
        let trans = ParameterEstimator::new(&schema()).estimate_transitions(&labels).unwrap();

        // drawing→drawing: 1, drawing→text: 2 ; text→drawing: 2, text→text: 1
        assert!((trans[0][0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((trans[0][1] - 2.0 / 3.0).abs() < 1e-12);
        assert!((trans[1][0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((trans[1][1] - 1.0 / 3.0).abs() < 1e-12);
        for row in &trans {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unseen_transition_source_is_uniform() {
        // "text" só aparece como último rótulo: nunca é origem de transição
        let labels = vec![vec!["drawing", "drawing", "text"]];
        let trans = ParameterEstimator::new(&schema()).estimate_transitions(&labels).unwrap();

        assert_eq!(trans[1], vec![0.5, 0.5]);
        assert!(trans.iter().flatten().all(|&p| p > 0.0));
        // drawing→drawing = 1/2, drawing→text = 1/2
        assert_eq!(trans[0], vec![0.5, 0.5]);
    }

    #[test]
    fn test_transition_floor_exceeds_one() {
        // drawing→drawing visto 2x, drawing→text nunca: 2/2 + 1/2
        let labels = vec![vec!["drawing", "drawing", "drawing"]];
        let trans = ParameterEstimator::new(&schema()).estimate_transitions(&labels).unwrap();
        assert!((trans[0].iter().sum::<f64>() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_discrete_emission_add_one() {
        let (observations, labels) = corpus();
        let emissions = ParameterEstimator::new(&schema())
            .estimate_emissions(&observations, &labels)
            .unwrap();

        // drawing: length = [1, 1, 1, 1, 1] → counts [1, 6] / (5 + 2)
        match &emissions[0][0] {
            Emission::Discrete { probs } => {
                assert!((probs[0] - 1.0 / 7.0).abs() < 1e-12);
                assert!((probs[1] - 6.0 / 7.0).abs() < 1e-12);
            }
            other => panic!("esperava emissão discreta, veio {other:?}"),
        }
        // text: length = [0, 0, 0, 0] → counts [5, 1] / (4 + 2)
        match &emissions[1][0] {
            Emission::Discrete { probs } => {
                assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
                assert!((probs[0] - 5.0 / 6.0).abs() < 1e-12);
            }
            other => panic!("esperava emissão discreta, veio {other:?}"),
        }
    }

    #[test]
    fn test_gaussian_uses_population_std() {
        let (observations, labels) = corpus();
        let emissions = ParameterEstimator::new(&schema())
            .estimate_emissions(&observations, &labels)
            .unwrap();

        // text: curvature = [3, 2, 4, 5] → média 3.5, var = (0.25+2.25+0.25+2.25)/4 = 1.25
        match emissions[1][1] {
            Emission::Gaussian { mean, std_dev } => {
                assert!((mean - 3.5).abs() < 1e-12);
                assert!((std_dev - 1.25f64.sqrt()).abs() < 1e-12);
            }
            ref other => panic!("esperava gaussiana, veio {other:?}"),
        }
    }

    #[test]
    fn test_gaussian_placeholder_without_samples() {
        let observations = vec![vec![Observation::new().with("length", 0)]];
        let labels = vec![vec!["drawing"]];
        let emissions = ParameterEstimator::new(&schema())
            .estimate_emissions(&observations, &labels)
            .unwrap();
        assert_eq!(emissions[0][1], Emission::Gaussian { mean: 0.0, std_dev: 1.0 });
        assert_eq!(emissions[1][1], Emission::Gaussian { mean: 0.0, std_dev: 1.0 });
    }

    #[test]
    fn test_unseen_state_still_has_full_tables() {
        let three = ModelSchema::new(
            vec!["drawing", "text", "erase"],
            vec![FeatureSpec::discrete("length", 2)],
        )
        .unwrap();
        let observations = vec![vec![
            Observation::new().with("length", 0),
            Observation::new().with("length", 1),
        ]];
        let labels = vec![vec!["drawing", "text"]];
        let model = train(&three, &observations, &labels).unwrap();

        assert_eq!(model.priors().len(), 3);
        assert!(model.priors().iter().all(|&p| p > 0.0));
        assert_eq!(model.transitions()[2], vec![1.0 / 3.0; 3]);
        assert_eq!(
            model.emission_of("erase", "length").unwrap(),
            &Emission::Discrete { probs: vec![0.5, 0.5] }
        );
    }

    #[test]
    fn test_fit_errors() {
        let s = schema();
        let (observations, labels) = corpus();

        assert!(matches!(
            train(&s, &observations[..2], &labels),
            Err(HmmError::DimensionMismatch(_))
        ));

        let mut short = labels.clone();
        short[1].pop();
        assert!(matches!(train(&s, &observations, &short), Err(HmmError::DimensionMismatch(_))));

        let mut unknown = labels.clone();
        unknown[2][1] = "erase";
        assert!(matches!(
            train(&s, &observations, &unknown),
            Err(HmmError::UnknownStateLabel(l)) if l == "erase"
        ));

        let none: Vec<Vec<&str>> = vec![];
        assert!(matches!(train(&s, &[], &none), Err(HmmError::EmptyTrainingSet)));

        let empty_seq: Vec<Vec<&str>> = vec![vec![]];
        assert!(matches!(train(&s, &[vec![]], &empty_seq), Err(HmmError::EmptySequence)));

        let mut bad_obs = observations.clone();
        bad_obs[0][0] = obs(7, 0.0);
        assert!(matches!(
            train(&s, &bad_obs, &labels),
            Err(HmmError::InvalidDiscreteValue { value: 7, .. })
        ));

        let mut unknown_feature = observations.clone();
        unknown_feature[1][0] = obs(0, 2.0).with("pressure", 0.3);
        assert!(matches!(
            train(&s, &unknown_feature, &labels),
            Err(HmmError::UnknownFeature(f)) if f == "pressure"
        ));

        let mut real_for_discrete = observations.clone();
        real_for_discrete[2][3] = Observation::new().with("length", 0.5).with("curvature", 2.0);
        assert!(matches!(
            train(&s, &real_for_discrete, &labels),
            Err(HmmError::FeatureKindMismatch(_))
        ));
    }

    #[test]
    fn test_summary() {
        let (observations, labels) = corpus();
        let summary = ParameterEstimator::new(&schema())
            .summarize(&observations, &labels)
            .unwrap();
        assert_eq!(summary.num_sequences, 3);
        assert_eq!(summary.num_observations, 9);
        assert_eq!(summary.state_counts, vec![5, 4]);
    }

    #[test]
    fn test_fit_with_summary_matches_separate_calls() {
        let s = schema();
        let (observations, labels) = corpus();
        let estimator = ParameterEstimator::new(&s);

        let (model, summary) = estimator.fit_with_summary(&observations, &labels).unwrap();
        assert_eq!(model, estimator.fit(&observations, &labels).unwrap());
        assert_eq!(summary, estimator.summarize(&observations, &labels).unwrap());

        let none: Vec<Vec<&str>> = vec![];
        assert!(matches!(
            estimator.fit_with_summary(&[], &none),
            Err(HmmError::EmptyTrainingSet)
        ));
    }
}
