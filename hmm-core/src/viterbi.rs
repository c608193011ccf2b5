//! # Algoritmo de Viterbi — Caminho de Estados Mais Provável
//!
//! Dado um [`HmmModel`] e uma sequência de observações de comprimento `T`,
//! encontra a sequência de estados que maximiza $P(y, x)$.
//!
//! ## Algoritmo
//!
//! ```text
//! Inicialização: score[0][s] = log prior(s) + log emit(s, x_0)
//!
//! Recursão:      score[t][s] = max_p [score[t-1][p] + log trans(p, s)] + log emit(s, x_t)
//!                backptr[t][s] = p que atingiu o máximo
//!
//! Terminação:    último = argmax_s score[T-1][s]
//!
//! Backtracking:  segue backptr de T-1 até 0
//! ```
//!
//! Complexidade: `O(T × K²)` para `K` estados.
//!
//! ## Desempate
//!
//! Os estados são percorridos **na ordem declarada no esquema** e um candidato
//! só substitui o melhor atual se for **estritamente maior**. Assim o primeiro
//! estado a atingir o máximo vence, e o resultado é sempre o mesmo para as
//! mesmas entradas.
//!
//! ## `-inf`
//!
//! Um modelo montado à mão pode ter probabilidade zero; `ln(0) = -inf` é
//! propagado normalmente. Se todos os candidatos forem `-inf`, o primeiro
//! estado é escolhido.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::model::HmmModel;
use crate::observation::{encode_sequence, Observation};
use crate::schema::StateId;

/// Score de um estado em uma posição (para visualização passo a passo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateScore {
    /// Nome do estado (ex: "drawing")
    pub state: String,
    /// Log-score acumulado do melhor caminho que termina neste estado
    pub score: f64,
    /// Estado anterior nesse melhor caminho (`None` na posição 0)
    pub best_prev: Option<String>,
    /// Log-emissão da observação neste estado
    pub emission: f64,
    /// Log-transição usada a partir de `best_prev` (`None` na posição 0)
    pub transition: Option<f64>,
}

/// Estado do Viterbi em uma posição da sequência.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViterbiStep {
    pub position: usize,
    pub scores: Vec<StateScore>,
    /// Estado com maior score nesta posição
    pub best_state: String,
    pub best_score: f64,
}

/// Resultado completo da decodificação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViterbiResult {
    /// Caminho ótimo em índices de estado
    pub path: Vec<StateId>,
    /// Caminho ótimo em nomes de estado
    pub labels: Vec<String>,
    /// Log-probabilidade conjunta do caminho ótimo
    pub log_score: f64,
    /// Tabela de scores por posição
    pub steps: Vec<ViterbiStep>,
}

/// Tabelas de programação dinâmica de uma execução.
struct Trellis {
    emission: Vec<Vec<f64>>,
    score: Vec<Vec<f64>>,
    backptr: Vec<Vec<usize>>,
}

/// Decodificador sobre um modelo emprestado.
///
/// Pré-calcula os logs de priors e transições uma vez; depois cada chamada é
/// independente e não altera nada, então o mesmo decodificador pode ser usado
/// por várias threads.
pub struct ViterbiDecoder<'m> {
    model: &'m HmmModel,
    log_priors: Vec<f64>,
    log_transitions: Vec<Vec<f64>>,
}

impl<'m> ViterbiDecoder<'m> {
    pub fn new(model: &'m HmmModel) -> Self {
        Self {
            model,
            log_priors: model.priors().iter().map(|p| p.ln()).collect(),
            log_transitions: model
                .transitions()
                .iter()
                .map(|row| row.iter().map(|p| p.ln()).collect())
                .collect(),
        }
    }

    /// Sequência de rótulos mais provável, mesmo comprimento da entrada.
    ///
    /// # Erros
    /// - [`HmmError::EmptySequence`] se a sequência for vazia.
    /// - [`HmmError::UnknownFeature`], [`HmmError::InvalidDiscreteValue`],
    ///   [`HmmError::FeatureKindMismatch`] para observações mal formadas.
    pub fn label(&self, sequence: &[Observation]) -> Result<Vec<String>> {
        let trellis = self.run(sequence)?;
        let (path, _) = self.backtrack(&trellis);
        Ok(self.model.schema().decode_labels(&path))
    }

    /// Como [`Self::label`], mas devolve também o score e a tabela completa.
    pub fn decode(&self, sequence: &[Observation]) -> Result<ViterbiResult> {
        let trellis = self.run(sequence)?;
        let (path, log_score) = self.backtrack(&trellis);
        let steps = self.steps(&trellis);

        Ok(ViterbiResult {
            labels: self.model.schema().decode_labels(&path),
            path,
            log_score,
            steps,
        })
    }

    /// Decodifica várias sequências em paralelo. Cada resultado é independente.
    pub fn label_batch(&self, sequences: &[Vec<Observation>]) -> Vec<Result<Vec<String>>> {
        sequences.par_iter().map(|seq| self.label(seq)).collect()
    }

    fn run(&self, sequence: &[Observation]) -> Result<Trellis> {
        if sequence.is_empty() {
            return Err(HmmError::EmptySequence);
        }
        // Valida a sequência inteira antes de qualquer conta
        let encoded = encode_sequence(self.model.schema(), sequence)?;

        let n_obs = encoded.len();
        let n_states = self.model.schema().num_states();

        let emission: Vec<Vec<f64>> = encoded
            .iter()
            .map(|obs| {
                self.model
                    .schema()
                    .state_ids()
                    .map(|s| self.model.log_emission(s, obs))
                    .collect()
            })
            .collect();

        let mut score = vec![vec![f64::NEG_INFINITY; n_states]; n_obs];
        let mut backptr = vec![vec![0usize; n_states]; n_obs];

        // 1. Inicialização (t = 0): sem transição
        for s in 0..n_states {
            score[0][s] = self.log_priors[s] + emission[0][s];
        }

        // 2. Recursão
        for t in 1..n_obs {
            for s in 0..n_states {
                let mut best_prob = f64::NEG_INFINITY;
                let mut best_prev = 0;

                for p in 0..n_states {
                    let prob = score[t - 1][p] + self.log_transitions[p][s];
                    if prob > best_prob {
                        best_prob = prob;
                        best_prev = p;
                    }
                }

                score[t][s] = best_prob + emission[t][s];
                backptr[t][s] = best_prev;
            }
        }

        Ok(Trellis {
            emission,
            score,
            backptr,
        })
    }

    fn backtrack(&self, trellis: &Trellis) -> (Vec<StateId>, f64) {
        let n_obs = trellis.score.len();

        // 3. Terminação
        let (mut curr, best_score) = first_argmax(&trellis.score[n_obs - 1]);

        // 4. Backtracking
        let mut path = vec![StateId(0); n_obs];
        path[n_obs - 1] = StateId(curr);
        for t in (1..n_obs).rev() {
            curr = trellis.backptr[t][curr];
            path[t - 1] = StateId(curr);
        }

        (path, best_score)
    }

    fn steps(&self, trellis: &Trellis) -> Vec<ViterbiStep> {
        let schema = self.model.schema();

        trellis
            .score
            .iter()
            .enumerate()
            .map(|(t, row)| {
                let scores = row
                    .iter()
                    .enumerate()
                    .map(|(s, &score)| {
                        let (best_prev, transition) = if t == 0 {
                            (None, None)
                        } else {
                            let prev = trellis.backptr[t][s];
                            (
                                Some(schema.state_name(StateId(prev)).to_string()),
                                Some(self.log_transitions[prev][s]),
                            )
                        };
                        StateScore {
                            state: schema.state_name(StateId(s)).to_string(),
                            score,
                            best_prev,
                            emission: trellis.emission[t][s],
                            transition,
                        }
                    })
                    .collect();

                let (best, best_score) = first_argmax(row);
                ViterbiStep {
                    position: t,
                    scores,
                    best_state: schema.state_name(StateId(best)).to_string(),
                    best_score,
                }
            })
            .collect()
    }
}

/// Retorna (índice, valor) do **primeiro** máximo estrito.
fn first_argmax(scores: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, &v) in scores.iter().enumerate() {
        if v > best_score {
            best = i;
            best_score = v;
        }
    }
    (best, best_score)
}

/// Atalho para `ViterbiDecoder::new(model).label(sequence)`.
pub fn label(model: &HmmModel, sequence: &[Observation]) -> Result<Vec<String>> {
    ViterbiDecoder::new(model).label(sequence)
}

/// Atalho para `ViterbiDecoder::new(model).decode(sequence)`.
pub fn decode(model: &HmmModel, sequence: &[Observation]) -> Result<ViterbiResult> {
    ViterbiDecoder::new(model).decode(sequence)
}

/// Atalho para `ViterbiDecoder::new(model).label_batch(sequences)`.
pub fn label_batch(model: &HmmModel, sequences: &[Vec<Observation>]) -> Vec<Result<Vec<String>>> {
    ViterbiDecoder::new(model).label_batch(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{weather_model, weather_observations};
    use crate::estimator::train;
    use crate::model::{gaussian_log_density, Emission};
    use crate::schema::{FeatureSpec, ModelSchema};

    fn evidence(v: i64) -> Observation {
        Observation::new().with("Evidence", v)
    }

    #[test]
    fn test_weather_example() {
        let model = weather_model();
        let labels = label(&model, &weather_observations()).unwrap();
        assert_eq!(labels, vec!["Sunny", "Cloudy", "Rainy"]);
    }

    #[test]
    fn test_weather_trace_scores() {
        let model = weather_model();
        let result = decode(&model, &weather_observations()).unwrap();

        assert_eq!(result.steps.len(), 3);
        // t=0: Sunny = 0.63 * 0.6
        assert!((result.steps[0].scores[0].score - (0.63f64 * 0.6).ln()).abs() < 1e-12);
        assert_eq!(result.steps[0].best_state, "Sunny");
        assert!(result.steps[0].scores[0].best_prev.is_none());
        // Caminho final: 0.378 * 0.375 * 0.25 * 0.625 * 0.5
        let expected = (0.378f64 * 0.375 * 0.25 * 0.625 * 0.5).ln();
        assert!((result.log_score - expected).abs() < 1e-9);
        assert_eq!(result.steps[2].scores[2].best_prev.as_deref(), Some("Cloudy"));
        assert_eq!(result.path, vec![StateId(0), StateId(1), StateId(2)]);
    }

    #[test]
    fn test_single_observation_uses_prior_and_emission_only() {
        let model = weather_model();
        // Evidence = 3: Sunny 0.63*0.05, Cloudy 0.17*0.25, Rainy 0.2*0.5 → Rainy
        assert_eq!(label(&model, &[evidence(3)]).unwrap(), vec!["Rainy"]);
        // Evidence = 0: Sunny 0.378 vence
        assert_eq!(label(&model, &[evidence(0)]).unwrap(), vec!["Sunny"]);
    }

    #[test]
    fn test_length_preserved_and_deterministic() {
        let model = weather_model();
        let seq: Vec<Observation> = [0, 1, 2, 3, 3, 2, 0, 1].iter().map(|&v| evidence(v)).collect();
        let first = label(&model, &seq).unwrap();
        let second = label(&model, &seq).unwrap();
        assert_eq!(first.len(), seq.len());
        assert_eq!(first, second);
    }

    #[test]
    fn test_error_cases() {
        let model = weather_model();
        assert!(matches!(label(&model, &[]), Err(HmmError::EmptySequence)));
        assert!(matches!(
            label(&model, &[evidence(0), evidence(4)]),
            Err(HmmError::InvalidDiscreteValue { value: 4, num_vals: 4, .. })
        ));
        assert!(matches!(
            label(&model, &[Observation::new().with("Wind", 1)]),
            Err(HmmError::UnknownFeature(_))
        ));
    }

    fn uniform_model(states: Vec<&str>) -> HmmModel {
        let k = states.len();
        let schema = ModelSchema::new(states, vec![FeatureSpec::discrete("f", 2)]).unwrap();
        HmmModel::from_parts(
            schema,
            vec![1.0 / k as f64; k],
            vec![vec![1.0 / k as f64; k]; k],
            vec![vec![Emission::Discrete { probs: vec![0.5, 0.5] }]; k],
        )
        .unwrap()
    }

    #[test]
    fn test_ties_go_to_first_declared_state() {
        let seq = vec![Observation::new().with("f", 0); 4];

        let ab = uniform_model(vec!["a", "b"]);
        assert_eq!(label(&ab, &seq).unwrap(), vec!["a"; 4]);

        let ba = uniform_model(vec!["b", "a"]);
        assert_eq!(label(&ba, &seq).unwrap(), vec!["b"; 4]);
    }

    #[test]
    fn test_zero_probabilities_do_not_panic() {
        let schema = ModelSchema::new(vec!["a", "b"], vec![FeatureSpec::discrete("f", 2)]).unwrap();
        // "a" nunca emite 1; "b" nunca é inicial; a→a proibido
        let model = HmmModel::from_parts(
            schema,
            vec![1.0, 0.0],
            vec![vec![0.0, 1.0], vec![0.5, 0.5]],
            vec![
                vec![Emission::Discrete { probs: vec![1.0, 0.0] }],
                vec![Emission::Discrete { probs: vec![0.5, 0.5] }],
            ],
        )
        .unwrap();

        let seq = vec![
            Observation::new().with("f", 0),
            Observation::new().with("f", 0),
            Observation::new().with("f", 1),
        ];
        assert_eq!(label(&model, &seq).unwrap(), vec!["a", "b", "b"]);

        // Impossível em qualquer caminho: todos -inf, sem panic
        let impossible = vec![Observation::new().with("f", 1)];
        let result = decode(&model, &impossible).unwrap();
        assert_eq!(result.log_score, f64::NEG_INFINITY);
        assert_eq!(result.labels, vec!["a"]);
    }

    #[test]
    fn test_empty_observation_relies_on_transitions() {
        // Sem features, a emissão é o produto vazio (= 1)
        let model = weather_model();
        let seq = vec![Observation::new(), Observation::new()];
        // Sunny(0.63) → Sunny(0.5) = 0.315 é o maior
        assert_eq!(label(&model, &seq).unwrap(), vec!["Sunny", "Sunny"]);
    }

    #[test]
    fn test_label_batch_matches_sequential() {
        let model = weather_model();
        let seqs = vec![
            weather_observations(),
            vec![evidence(3)],
            vec![],
            vec![evidence(1), evidence(1)],
        ];
        let batch = label_batch(&model, &seqs);

        assert_eq!(batch.len(), 4);
        for (seq, result) in seqs.iter().zip(&batch) {
            match (label(&model, seq), result) {
                (Ok(a), Ok(b)) => assert_eq!(&a, b),
                (Err(_), Err(_)) => {}
                other => panic!("resultados divergentes: {other:?}"),
            }
        }
        assert!(matches!(batch[2], Err(HmmError::EmptySequence)));
    }

    #[test]
    fn test_gaussian_outlier_prefers_closer_state() {
        let schema = ModelSchema::new(vec!["far", "near"], vec![FeatureSpec::continuous("x")]).unwrap();
        let model = HmmModel::from_parts(
            schema,
            vec![0.5, 0.5],
            vec![vec![0.5, 0.5], vec![0.5, 0.5]],
            vec![
                vec![Emission::Gaussian { mean: 0.0, std_dev: 1.0 }],
                vec![Emission::Gaussian { mean: 30.0, std_dev: 1.0 }],
            ],
        )
        .unwrap();

        // 70σ de "far" e 40σ de "near": as densidades lineares são 0.0 em f64
        let result = decode(&model, &[Observation::new().with("x", 70.0)]).unwrap();
        assert_eq!(result.labels, vec!["near"]);
        assert!(result.log_score.is_finite());

        let norm = -(2.0 * std::f64::consts::PI).sqrt().ln();
        let scores = &result.steps[0].scores;
        assert!((scores[0].emission - (-2450.0 + norm)).abs() < 1e-9);
        assert!((scores[1].emission - (-800.0 + norm)).abs() < 1e-9);
    }

    fn stroke(length: i64, curvature: f64) -> Observation {
        Observation::new().with("length", length).with("curvature", curvature)
    }

    fn log_emission_of(model: &HmmModel, state: &str, length: usize, curvature: f64) -> f64 {
        let discrete = match model.emission_of(state, "length").unwrap() {
            Emission::Discrete { probs } => probs[length].ln(),
            other => panic!("emissão inesperada: {other:?}"),
        };
        let continuous = match model.emission_of(state, "curvature").unwrap() {
            Emission::Gaussian { mean, std_dev } => gaussian_log_density(curvature, *mean, *std_dev),
            other => panic!("emissão inesperada: {other:?}"),
        };
        discrete + continuous
    }

    #[test]
    fn test_decode_mixed_discrete_and_continuous_features() {
        let schema = ModelSchema::new(
            vec!["drawing", "text"],
            vec![FeatureSpec::discrete("length", 2), FeatureSpec::continuous("curvature")],
        )
        .unwrap();
        let observations = vec![
            vec![stroke(1, 0.1), stroke(1, 0.3), stroke(0, 2.0), stroke(0, 3.0)],
            vec![stroke(0, 2.5), stroke(1, 0.2)],
        ];
        let labels = vec![
            vec!["drawing", "drawing", "text", "text"],
            vec!["text", "drawing"],
        ];
        let model = train(&schema, &observations, &labels).unwrap();

        // drawing: curvatura média 0.2; text: média 2.5
        let seq = vec![stroke(1, 0.25), stroke(0, 2.8), stroke(1, 40.0)];
        let result = decode(&model, &seq).unwrap();

        // A curvatura 40 está a centenas de σ de drawing e ~92σ de text
        assert_eq!(result.labels, vec!["drawing", "text", "text"]);
        assert!(result.log_score.is_finite());

        let expected = [(1, 0.25), (0, 2.8), (1, 40.0)];
        for (step, &(length, curvature)) in result.steps.iter().zip(&expected) {
            for score in &step.scores {
                let want = log_emission_of(&model, &score.state, length, curvature);
                assert!(score.emission.is_finite());
                assert!(
                    (score.emission - want).abs() < 1e-9 * want.abs().max(1.0),
                    "posição {} estado {}: {} != {}",
                    step.position,
                    score.state,
                    score.emission,
                    want
                );
            }
        }
    }
}
