use serde::{Deserialize, Serialize};
use shared::ClassLabel;

use super::augmentation::augment;
use super::calibration::ScoreVector;
use super::enhancement::enhance;
use super::error::PipelineError;
use super::normalizer::DecodedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    #[default]
    TestTimeAugmentation,
    Enhancement,
}

impl EnsembleKind {
    pub fn variants(self, decoded: &DecodedImage) -> Result<Vec<DecodedImage>, PipelineError> {
        match self {
            EnsembleKind::TestTimeAugmentation => augment(decoded),
            EnsembleKind::Enhancement => enhance(decoded),
        }
    }
}

/// How member scores are folded into one vector before calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Element-wise mean over all members.
    #[default]
    Mean,
    /// Mean over the members whose top class is the most voted one.
    MajorityVote,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnsembleConfig {
    pub enabled: bool,
    pub kind: EnsembleKind,
    pub reduction: Reduction,
}

pub fn reduce(members: &[ScoreVector], reduction: Reduction) -> Result<ScoreVector, PipelineError> {
    match reduction {
        Reduction::Mean => mean(members.iter()),
        Reduction::MajorityVote => {
            let mut votes = [0usize; ClassLabel::ALL.len()];
            for member in members {
                votes[member.top().index()] += 1;
            }
            // Ties go to the lower class index.
            let most = votes.iter().copied().max().unwrap_or(0);
            let winner = ClassLabel::ALL
                .iter()
                .copied()
                .find(|label| votes[label.index()] == most)
                .unwrap_or(ClassLabel::ALL[0]);
            mean(members.iter().filter(|member| member.top() == winner))
        }
    }
}

fn mean<'a>(members: impl Iterator<Item = &'a ScoreVector>) -> Result<ScoreVector, PipelineError> {
    let mut sums = vec![0.0f64; ClassLabel::ALL.len()];
    let mut count = 0usize;
    for member in members {
        for (sum, score) in sums.iter_mut().zip(member.scores()) {
            *sum += f64::from(*score);
        }
        count += 1;
    }
    if count == 0 {
        return Err(PipelineError::InvalidScores(
            "ensemble produced no scores".to_string(),
        ));
    }
    ScoreVector::new(sums.into_iter().map(|s| (s / count as f64) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: [f32; 3]) -> ScoreVector {
        ScoreVector::new(values.to_vec()).unwrap()
    }

    fn close(a: &ScoreVector, b: [f32; 3]) -> bool {
        a.scores().iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    #[test]
    fn mean_averages_each_class() {
        let members = [scores([0.9, 0.1, 0.0]), scores([0.5, 0.3, 0.2])];
        let reduced = reduce(&members, Reduction::Mean).unwrap();
        assert!(close(&reduced, [0.7, 0.2, 0.1]));
    }

    #[test]
    fn majority_vote_averages_only_the_winners() {
        let members = [
            scores([0.6, 0.3, 0.1]),
            scores([0.8, 0.1, 0.1]),
            scores([0.1, 0.1, 0.8]),
        ];
        let reduced = reduce(&members, Reduction::MajorityVote).unwrap();
        assert!(close(&reduced, [0.7, 0.2, 0.1]));
        assert_eq!(reduced.top(), ClassLabel::EarlyBlight);
    }

    #[test]
    fn vote_ties_go_to_the_lower_index() {
        let members = [scores([0.1, 0.1, 0.8]), scores([0.1, 0.7, 0.2])];
        let reduced = reduce(&members, Reduction::MajorityVote).unwrap();
        assert!(close(&reduced, [0.1, 0.7, 0.2]));
    }

    #[test]
    fn empty_ensemble_is_rejected() {
        assert!(matches!(
            reduce(&[], Reduction::Mean),
            Err(PipelineError::InvalidScores(_))
        ));
        assert!(matches!(
            reduce(&[], Reduction::MajorityVote),
            Err(PipelineError::InvalidScores(_))
        ));
    }

    #[test]
    fn both_kinds_yield_five_variants() {
        let image = ndarray::Array3::from_elem((16, 16, 3), 100u8);
        for kind in [EnsembleKind::TestTimeAugmentation, EnsembleKind::Enhancement] {
            assert_eq!(kind.variants(&image).unwrap().len(), 5);
        }
    }
}
