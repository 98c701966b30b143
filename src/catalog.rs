//! Built-in curricula.
//!
//! These are the curricula shipped with the binary. `autotrain curricula
//! install` publishes them to the configured artifact store; the manager
//! itself only ever reads curricula back through the resolver.

use serde_json::json;

use crate::core::condition::{field, last, mean};
use crate::core::{
    Condition, Curriculum, MetricsSchema, ParameterBundle, TrainingStage, TransitionRule,
    SESSION_AT_CURRENT_STAGE, SESSION_TOTAL,
};
use crate::error::Result;

/// Name of the coupled-baiting dynamic foraging task.
pub const COUPLED_BAITING: &str = "Coupled Baiting";

/// Name of the uncoupled-baiting dynamic foraging task.
pub const UNCOUPLED_BAITING: &str = "Uncoupled Baiting";

/// Name of the uncoupled dynamic foraging task without baiting.
pub const UNCOUPLED_NO_BAITING: &str = "Uncoupled Without Baiting";

/// Name of the coupled task without baiting, used by intermediate stages.
const COUPLED_NO_BAITING: &str = "Coupled Without Baiting";

/// Name of the dummy demonstration task.
pub const DUMMY_TASK: &str = "Dummy task";

/// All built-in curricula.
pub fn builtin_curricula() -> Result<Vec<Curriculum>> {
    Ok(vec![
        coupled_baiting()?,
        uncoupled_baiting()?,
        uncoupled_no_baiting()?,
        dummy_task()?,
    ])
}

/// Last session reached `trials` finished trials and `efficiency`.
fn engaged(trials: f64, efficiency: f64) -> Condition {
    Condition::all([
        last("finished_trials").ge(trials),
        last("foraging_efficiency").ge(efficiency),
    ])
}

/// Last session fell below `trials` finished trials or `efficiency`.
fn struggling(trials: f64, efficiency: f64) -> Condition {
    Condition::any([
        last("finished_trials").lt(trials),
        last("foraging_efficiency").lt(efficiency),
    ])
}

/// Warmup stage shared by the dynamic foraging curricula: coupled
/// baiting, p_sum = 0.8, p_ratio = [1:0], generous auto water.
fn foraging_warmup() -> ParameterBundle {
    ParameterBundle::new(TrainingStage::Stage1Warmup, "1.1.0")
        .with_description(
            "Warmup, followed by Phase B (block = [10, 20, 5], p_sum = 0.8, p_ratio = [1:0])",
        )
        .with("task", COUPLED_BAITING)
        .with("warmup", "on")
        .with("warm_min_trial", 50)
        .with("warm_max_choice_ratio_bias", 0.1)
        .with("warm_min_finish_ratio", 0.8)
        .with("warm_windowsize", 20)
        .with("BaseRewardSum", 0.8)
        .with("RewardFamily", 3)
        .with("RewardPairsN", 1)
        .with("BlockMin", 10)
        .with("BlockMax", 20)
        .with("BlockBeta", 5)
        .with("BlockMinReward", 0)
        .with("ITIMin", 1)
        .with("ITIMax", 7)
        .with("ITIBeta", 3)
        .with("DelayMin", 0.1)
        .with("DelayMax", 0.1)
        .with("DelayBeta", 0)
        .with("RewardDelay", 0.0)
        .with("RightValue_volume", 4.0)
        .with("LeftValue_volume", 4.0)
        .with("AutoReward", true)
        .with("AutoWaterType", "Natural")
        .with("Unrewarded", 3)
        .with("Ignored", 3)
        .with("Multiplier", 0.5)
        .with("AdvancedBlockAuto", "now")
        .with("SwitchThr", 0.5)
        .with("PointsInARow", 5)
        .with("MaxTrial", 1000)
        .with("MaxTime", 75)
        .with("StopIgnores", 20000)
        .with("ResponseTime", 5.0)
        .with("RewardConsumeTime", 1.0)
}

/// Stage 1: warmup off, smaller drops, less auto water.
fn foraging_stage_1(warmup: &ParameterBundle, description: &str) -> ParameterBundle {
    warmup.derive(
        TrainingStage::Stage1,
        description,
        [
            ("warmup", json!("off")),
            ("Unrewarded", json!(5)),
            ("Ignored", json!(5)),
            ("RightValue_volume", json!(2.0)),
            ("LeftValue_volume", json!(2.0)),
        ],
    )
}

/// Warmup rules shared by every foraging curriculum.
fn warmup_rules() -> Vec<TransitionRule> {
    vec![
        TransitionRule::progress(
            TrainingStage::Stage2,
            "Finished trials >= 200 and efficiency >= 0.6",
            engaged(200.0, 0.6),
        ),
        TransitionRule::progress(
            TrainingStage::Stage1,
            "After the first session",
            field(SESSION_AT_CURRENT_STAGE).ge(1.0),
        ),
    ]
}

fn stage_1_rules() -> Vec<TransitionRule> {
    vec![TransitionRule::progress(
        TrainingStage::Stage2,
        "Finished trials >= 200 and efficiency >= 0.6",
        engaged(200.0, 0.6),
    )]
}

/// "Coupled Baiting" 2.3: warmup, stages 1 to 3, final, graduated.
pub fn coupled_baiting() -> Result<Curriculum> {
    use TrainingStage::*;

    let warmup = foraging_warmup();
    let stage_1 = foraging_stage_1(
        &warmup,
        "Phase B (block = [10, 20, 5], p_sum = 0.8, p_ratio = [1:0])",
    );

    let stage_2 = stage_1.derive(
        Stage2,
        "Phase C (block = [10, 40, 10], p_sum = 0.6, p_ratio = [8:1])",
        [
            ("BaseRewardSum", json!(0.6)),
            ("RewardFamily", json!(1)),
            ("BlockMax", json!(40)),
            ("BlockBeta", json!(10)),
            ("ITIMax", json!(10)),
            ("DelayMin", json!(0.3)),
            ("DelayMax", json!(0.3)),
            ("Unrewarded", json!(7)),
            ("Ignored", json!(7)),
            ("SwitchThr", json!(0.6)),
            ("StopIgnores", json!(25)),
            ("ResponseTime", json!(3)),
        ],
    );

    let stage_3 = stage_2.derive(
        Stage3,
        "Phase D (block = [20, 60, 20], p_sum = 0.45, p_ratio = [8:1])",
        [
            ("BaseRewardSum", json!(0.45)),
            ("BlockMin", json!(20)),
            ("BlockMax", json!(60)),
            ("BlockBeta", json!(20)),
            ("ITIMax", json!(15)),
            ("DelayMin", json!(0.5)),
            ("DelayMax", json!(0.5)),
            ("DelayBeta", json!(0.0)),
            ("Unrewarded", json!(10)),
            ("Ignored", json!(10)),
            ("ResponseTime", json!(2)),
        ],
    );

    let stage_final = stage_3.derive(
        StageFinal,
        "Phase E, full task (block = [20, 60, 20], p_sum = 0.45, p_ratio = [8:1], [6:1], [3:1], [1:1])",
        [
            ("RewardPairsN", json!(4)),
            ("ITIMax", json!(30)),
            ("DelayMin", json!(1.0)),
            ("DelayMax", json!(1.0)),
            ("AutoReward", json!(false)),
            ("AdvancedBlockAuto", json!("off")),
            ("ResponseTime", json!(1.0)),
            ("RewardConsumeTime", json!(3.0)),
        ],
    );

    Curriculum::builder(COUPLED_BAITING, "2.3", MetricsSchema::DynamicForaging)
        .description("2024-08-16 max_len = 75 mins; decrease finished trial criterion")
        .entry_stage(Stage1Warmup)
        .parameters(Stage1Warmup, warmup)
        .parameters(Stage1, stage_1)
        .parameters(Stage2, stage_2)
        .parameters(Stage3, stage_3)
        .parameters(Graduated, stage_final.clone())
        .parameters(StageFinal, stage_final)
        .transitions(Stage1Warmup, warmup_rules())
        .transitions(Stage1, stage_1_rules())
        .transitions(
            Stage2,
            vec![
                TransitionRule::progress(
                    Stage3,
                    "Finished trials >= 300 and efficiency >= 0.65",
                    engaged(300.0, 0.65),
                ),
                TransitionRule::rollback(
                    Stage1,
                    "Finished trials < 200 or efficiency < 0.55",
                    struggling(200.0, 0.55),
                ),
            ],
        )
        .transitions(
            Stage3,
            vec![
                TransitionRule::progress(
                    StageFinal,
                    "Finished trials >= 400 and efficiency >= 0.7",
                    engaged(400.0, 0.7),
                ),
                TransitionRule::rollback(
                    Stage2,
                    "Finished trials < 300 or efficiency < 0.65",
                    struggling(300.0, 0.65),
                ),
            ],
        )
        .transitions(
            StageFinal,
            vec![
                TransitionRule::progress(
                    Graduated,
                    "For recent 5 sessions, mean finished trials >= 450 and mean efficiency \
                     >= 0.70 and total sessions >= 10 and sessions at final >= 5",
                    Condition::all([
                        field(SESSION_TOTAL).ge(10.0),
                        field(SESSION_AT_CURRENT_STAGE).ge(5.0),
                        mean("finished_trials", 5).ge(450.0),
                        mean("foraging_efficiency", 5).ge(0.70),
                    ]),
                ),
                TransitionRule::rollback(
                    Stage3,
                    "For recent 5 sessions, mean finished trials < 300 or efficiency < 0.60",
                    Condition::any([
                        mean("finished_trials", 5).lt(300.0),
                        mean("foraging_efficiency", 5).lt(0.60),
                    ]),
                ),
            ],
        )
        .build()
}

/// "Uncoupled Baiting" 2.1: coupled baiting until stage 2, then
/// uncoupled baiting with p_rew = [0.1, 0.4, 0.7].
pub fn uncoupled_baiting() -> Result<Curriculum> {
    use TrainingStage::*;

    let phase_a = "(block = [10, 30, 10], p_sum = 0.8, p_ratio = [1:0])";
    let warmup = foraging_warmup().derive(
        Stage1Warmup,
        format!("Warmup, followed by Phase B {phase_a}"),
        [
            ("BlockMax", json!(30)),
            ("BlockBeta", json!(10)),
            ("MaxTime", json!(90)),
        ],
    );
    let stage_1 = foraging_stage_1(&warmup, &format!("Phase B {phase_a}"));

    let stage_2 = stage_1.derive(
        Stage2,
        "Coupled baiting (block = [20, 35, 10], p_sum = 0.8, p_ratio = [8:1])",
        [
            ("RewardFamily", json!(1)),
            ("Unrewarded", json!(10)),
            ("Ignored", json!(10)),
            ("BlockMin", json!(20)),
            ("BlockMax", json!(35)),
            ("ITIMax", json!(10)),
            ("DelayMin", json!(0.3)),
            ("DelayMax", json!(0.3)),
            ("ResponseTime", json!(3.0)),
        ],
    );

    let stage_3 = stage_2.derive(
        Stage3,
        "Switch to uncoupled but still baiting; p_rew = [0.1, 0.4, 0.7]; turn on auto water for 1 day",
        [
            ("task", json!(UNCOUPLED_BAITING)),
            ("UncoupledReward", json!("0.1, 0.4, 0.7")),
            ("DelayMin", json!(0.5)),
            ("DelayMax", json!(0.5)),
            ("ITIMax", json!(15)),
            ("Unrewarded", json!(15)),
            ("Ignored", json!(15)),
            ("AdvancedBlockAuto", json!("off")),
            ("ResponseTime", json!(2.0)),
        ],
    );

    let stage_final = stage_3.derive(
        StageFinal,
        "Uncoupled baiting; p_rew = [0.1, 0.4, 0.7]; turn off auto water",
        [
            ("ITIMin", json!(1.0)),
            ("ITIMax", json!(30.0)),
            ("ITIBeta", json!(3.0)),
            ("DelayMin", json!(1.0)),
            ("DelayMax", json!(1.0)),
            ("RewardDelay", json!(0)),
            ("AutoReward", json!(false)),
            ("ResponseTime", json!(1.0)),
            ("RewardConsumeTime", json!(3.0)),
        ],
    );

    Curriculum::builder(UNCOUPLED_BAITING, "2.1", MetricsSchema::DynamicForaging)
        .description("2024-05-09 decrease delay period as we now use much longer early lick punishment")
        .entry_stage(Stage1Warmup)
        .parameters(Stage1Warmup, warmup)
        .parameters(Stage1, stage_1)
        .parameters(Stage2, stage_2)
        .parameters(Stage3, stage_3)
        .parameters(Graduated, stage_final.clone())
        .parameters(StageFinal, stage_final)
        .transitions(Stage1Warmup, warmup_rules())
        .transitions(Stage1, stage_1_rules())
        .transitions(
            Stage2,
            vec![
                TransitionRule::progress(
                    Stage3,
                    "Finished trials >= 300 and efficiency >= 0.65 and stay for >= 2 days",
                    Condition::all([
                        engaged(300.0, 0.65),
                        field(SESSION_AT_CURRENT_STAGE).ge(2.0),
                    ]),
                ),
                TransitionRule::rollback(
                    Stage1,
                    "Finished trials < 200 or efficiency < 0.55",
                    struggling(200.0, 0.55),
                ),
            ],
        )
        .transitions(
            Stage3,
            vec![TransitionRule::progress(
                StageFinal,
                "Just stay for 1 day",
                field(SESSION_AT_CURRENT_STAGE).ge(1.0),
            )],
        )
        .transitions(
            StageFinal,
            vec![
                TransitionRule::progress(
                    Graduated,
                    "For recent 5 sessions, mean finished trials >= 500 and mean efficiency \
                     >= 0.70 and total sessions >= 10 and sessions at final >= 5",
                    Condition::all([
                        field(SESSION_TOTAL).ge(10.0),
                        field(SESSION_AT_CURRENT_STAGE).ge(5.0),
                        mean("finished_trials", 5).ge(500.0),
                        mean("foraging_efficiency", 5).ge(0.70),
                    ]),
                ),
                TransitionRule::rollback(
                    Stage3,
                    "For recent 2 sessions, mean finished trials < 300 or efficiency < 0.6",
                    Condition::any([
                        mean("finished_trials", 2).lt(300.0),
                        mean("foraging_efficiency", 2).lt(0.6),
                    ]),
                ),
            ],
        )
        .build()
}

/// "Uncoupled Without Baiting" 2.3.1rwdDelay159: coupled stages without
/// baiting, then uncoupled with p_rew = [0.1, 0.5, 0.9] and a reward delay.
pub fn uncoupled_no_baiting() -> Result<Curriculum> {
    use TrainingStage::*;

    let phase_a = "(block = [10, 30, 10], p_sum = 0.8, p_ratio = [1:0])";
    let warmup = foraging_warmup().derive(
        Stage1Warmup,
        format!("Warmup, followed by Phase B {phase_a}"),
        [
            ("BlockMax", json!(30)),
            ("BlockBeta", json!(10)),
            ("DelayMin", json!(0)),
            ("DelayMax", json!(0)),
            ("RewardDelay", json!(0.1)),
        ],
    );
    let stage_1 = foraging_stage_1(&warmup, &format!("Phase B {phase_a}"));

    let stage_2 = stage_1.derive(
        Stage2,
        "Coupled without baiting (block = [20, 35, 10], p_sum = 0.8, p_ratio = [8:1])",
        [
            ("task", json!(COUPLED_NO_BAITING)),
            ("RewardFamily", json!(1)),
            ("Unrewarded", json!(7)),
            ("Ignored", json!(7)),
            ("BlockMin", json!(20)),
            ("BlockMax", json!(35)),
            ("ITIMax", json!(10)),
            ("DelayMin", json!(0.25)),
            ("DelayMax", json!(0.25)),
            ("StopIgnores", json!(25)),
            ("ResponseTime", json!(1.5)),
        ],
    );

    let stage_3 = stage_2.derive(
        Stage3,
        "Coupled without baiting (block = [20, 35, 10], p_sum = 0.8, p_ratio = [8:1]), turn on no lick window",
        [
            ("Unrewarded", json!(10)),
            ("Ignored", json!(10)),
            ("DelayMin", json!(1.0)),
            ("DelayMax", json!(1.0)),
        ],
    );

    let stage_4 = stage_3.derive(
        Stage4,
        "Switch to uncoupled; p_rew = [0.1, 0.5, 0.9]; turn on auto water for 1 day",
        [
            ("task", json!(UNCOUPLED_NO_BAITING)),
            ("UncoupledReward", json!("0.1, 0.5, 0.9")),
            ("RewardDelay", json!(0.15)),
            ("ITIMax", json!(15)),
            ("AdvancedBlockAuto", json!("off")),
        ],
    );

    let stage_final = stage_4.derive(
        StageFinal,
        "Uncoupled without baiting; p_rew = [0.1, 0.5, 0.9]; turn off auto water",
        [
            ("ITIMin", json!(2.0)),
            ("ITIMax", json!(15.0)),
            ("ITIBeta", json!(3.0)),
            ("DelayBeta", json!(0.0)),
            ("RewardDelay", json!(0.2)),
            ("AutoReward", json!(false)),
        ],
    );

    Curriculum::builder(UNCOUPLED_NO_BAITING, "2.3.1rwdDelay159", MetricsSchema::DynamicForaging)
        .description("2024-08-16 max_len = 75 mins; decrease finished trial criterion")
        .entry_stage(Stage1Warmup)
        .parameters(Stage1Warmup, warmup)
        .parameters(Stage1, stage_1)
        .parameters(Stage2, stage_2)
        .parameters(Stage3, stage_3)
        .parameters(Stage4, stage_4)
        .parameters(Graduated, stage_final.clone())
        .parameters(StageFinal, stage_final)
        .transitions(Stage1Warmup, warmup_rules())
        .transitions(Stage1, stage_1_rules())
        .transitions(
            Stage2,
            vec![
                TransitionRule::progress(
                    Stage3,
                    "Stay for >= 3 days",
                    field(SESSION_AT_CURRENT_STAGE).ge(3.0),
                ),
                TransitionRule::rollback(
                    Stage1,
                    "Finished trials < 200 or efficiency < 0.55",
                    struggling(200.0, 0.55),
                ),
            ],
        )
        .transitions(
            Stage3,
            vec![
                TransitionRule::progress(
                    Stage4,
                    "Finished trials >= 300 and efficiency >= 0.65 and stay for >= 3 days",
                    Condition::all([
                        engaged(300.0, 0.65),
                        field(SESSION_AT_CURRENT_STAGE).ge(3.0),
                    ]),
                ),
                TransitionRule::rollback(
                    Stage2,
                    "Finished trials < 250 or efficiency < 0.50 after stay for >= 3 days",
                    Condition::all([
                        struggling(250.0, 0.50),
                        field(SESSION_AT_CURRENT_STAGE).ge(3.0),
                    ]),
                ),
            ],
        )
        .transitions(
            Stage4,
            vec![TransitionRule::progress(
                StageFinal,
                "Just stay for 2 days",
                field(SESSION_AT_CURRENT_STAGE).ge(2.0),
            )],
        )
        .transitions(
            StageFinal,
            vec![
                TransitionRule::progress(
                    Graduated,
                    "For recent 5 sessions, mean finished trials >= 400 and mean efficiency \
                     >= 0.65 and total sessions >= 10 and sessions at final >= 5",
                    Condition::all([
                        field(SESSION_TOTAL).ge(10.0),
                        field(SESSION_AT_CURRENT_STAGE).ge(5.0),
                        mean("finished_trials", 5).ge(400.0),
                        mean("foraging_efficiency", 5).ge(0.65),
                    ]),
                ),
                TransitionRule::rollback(
                    Stage4,
                    "For recent 5 sessions, mean finished trials < 250 or efficiency < 0.6",
                    Condition::any([
                        mean("finished_trials", 5).lt(250.0),
                        mean("foraging_efficiency", 5).lt(0.60),
                    ]),
                ),
            ],
        )
        .build()
}

/// "Dummy task" 0.2: complex transitions and no absorbing stage.
pub fn dummy_task() -> Result<Curriculum> {
    use TrainingStage::*;

    let bundle = |stage, description: &str, flag: bool, value: f64| {
        ParameterBundle::new(stage, "0.1")
            .with_description(description)
            .with("task", DUMMY_TASK)
            .with("dummy_para_bool", flag)
            .with("dummy_para_float", value)
    };

    let both = |float_cmp: Condition, int_cmp: Condition| Condition::all([float_cmp, int_cmp]);
    let to_final = || {
        TransitionRule::progress(
            StageFinal,
            "metric float > 1.0 and metric int > 10",
            both(
                last("dummy_metric_float").gt(1.0),
                last("dummy_metric_int").gt(10.0),
            ),
        )
    };
    let back_to_1 = || {
        TransitionRule::rollback(
            Stage1,
            "metric float < 0.6 and metric int < 7",
            both(
                last("dummy_metric_float").lt(0.6),
                last("dummy_metric_int").lt(7.0),
            ),
        )
    };

    Curriculum::builder(DUMMY_TASK, "0.2", MetricsSchema::DummyTask)
        .description("A dummy curriculum showing complex transitions and no absorbing GRADUATED stage")
        .parameters(Stage1, bundle(Stage1, "Dummy stage 1", false, 0.1))
        .parameters(Stage2, bundle(Stage2, "Dummy stage interesting", true, 0.2))
        .parameters(Stage3, bundle(Stage3, "Dummy stage interesting", false, 0.0))
        .parameters(StageFinal, bundle(StageFinal, "Dummy stage final", false, 0.2))
        .transitions(
            Stage1,
            vec![
                to_final(),
                TransitionRule::progress(
                    Stage2,
                    "metric float > 0.5 and metric int > 5",
                    both(
                        last("dummy_metric_float").gt(0.5),
                        last("dummy_metric_int").gt(5.0),
                    ),
                ),
            ],
        )
        .transitions(
            Stage2,
            vec![
                to_final(),
                TransitionRule::progress(
                    Stage3,
                    "metric float > 0.6 and metric int > 7",
                    both(
                        last("dummy_metric_float").gt(0.6),
                        last("dummy_metric_int").gt(7.0),
                    ),
                ),
            ],
        )
        .transitions(Stage3, vec![to_final(), back_to_1()])
        .transitions(StageFinal, vec![back_to_1()])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Decision, DummyTaskMetrics, DynamicForagingMetrics};

    fn foraging(
        eff: &[f64],
        trials: &[f64],
        at_stage: u32,
    ) -> DynamicForagingMetrics {
        DynamicForagingMetrics {
            session_total: eff.len() as u32,
            session_at_current_stage: at_stage,
            foraging_efficiency: eff.to_vec(),
            finished_trials: trials.to_vec(),
        }
    }

    fn dummy(float: f64, int: f64) -> DummyTaskMetrics {
        DummyTaskMetrics {
            session_total: 1,
            session_at_current_stage: 1,
            dummy_metric_float: vec![float],
            dummy_metric_int: vec![int],
        }
    }

    #[test]
    fn test_builtins_build_without_warnings() {
        for curriculum in builtin_curricula().unwrap() {
            assert!(
                curriculum.validate().is_empty(),
                "{}: {:?}",
                curriculum.key(),
                curriculum.validate()
            );
        }
    }

    #[test]
    fn test_coupled_baiting_identity() {
        let c = coupled_baiting().unwrap();
        assert_eq!(c.key().to_string(), "Coupled Baiting v2.3 (schema 1.0)");
        assert_eq!(c.entry_stage(), TrainingStage::Stage1Warmup);
        assert_eq!(c.metrics_schema(), MetricsSchema::DynamicForaging);
        assert_eq!(
            c.parameters_for(TrainingStage::Graduated),
            c.parameters_for(TrainingStage::StageFinal)
        );
    }

    #[test]
    fn test_warmup_moves_on_after_one_session() {
        let c = coupled_baiting().unwrap();
        let poor = foraging(&[0.3], &[80.0], 1);
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage1Warmup, &poor).unwrap(),
            (Decision::Progress, TrainingStage::Stage1)
        );

        let strong = foraging(&[0.7], &[220.0], 1);
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage1Warmup, &strong).unwrap(),
            (Decision::Progress, TrainingStage::Stage2)
        );
    }

    #[test]
    fn test_stage_2_rollback_and_stay() {
        let c = coupled_baiting().unwrap();
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage2, &foraging(&[0.5], &[320.0], 2))
                .unwrap(),
            (Decision::Rollback, TrainingStage::Stage1)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage2, &foraging(&[0.6], &[250.0], 2))
                .unwrap(),
            (Decision::Stay, TrainingStage::Stage2)
        );
    }

    #[test]
    fn test_graduation_needs_enough_sessions() {
        let c = coupled_baiting().unwrap();
        let eff = [0.75; 10];
        let trials = [500.0; 10];

        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &foraging(&eff, &trials, 5))
                .unwrap(),
            (Decision::Progress, TrainingStage::Graduated)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &foraging(&eff, &trials, 4))
                .unwrap(),
            (Decision::Stay, TrainingStage::StageFinal)
        );
        assert_eq!(
            c.evaluate_transition(
                TrainingStage::StageFinal,
                &foraging(&eff[..9], &trials[..9], 9)
            )
            .unwrap(),
            (Decision::Stay, TrainingStage::StageFinal)
        );
    }

    #[test]
    fn test_final_rollback_uses_window_mean() {
        let c = coupled_baiting().unwrap();
        // Last session is fine but the 5-session mean is below 300.
        let trials = [100.0, 100.0, 100.0, 100.0, 450.0];
        let eff = [0.7; 5];
        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &foraging(&eff, &trials, 5))
                .unwrap(),
            (Decision::Rollback, TrainingStage::Stage3)
        );
    }

    #[test]
    fn test_builtin_keys_are_distinct() {
        let keys: Vec<String> = builtin_curricula()
            .unwrap()
            .iter()
            .map(|c| c.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "Coupled Baiting v2.3 (schema 1.0)",
                "Uncoupled Baiting v2.1 (schema 1.0)",
                "Uncoupled Without Baiting v2.3.1rwdDelay159 (schema 1.0)",
                "Dummy task v0.2 (schema 1.0)",
            ]
        );
    }

    #[test]
    fn test_uncoupled_baiting_stage_2_needs_two_sessions() {
        let c = uncoupled_baiting().unwrap();
        assert_eq!(c.entry_stage(), TrainingStage::Stage1Warmup);
        let strong = |at_stage| foraging(&[0.7], &[320.0], at_stage);
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage2, &strong(1)).unwrap(),
            (Decision::Stay, TrainingStage::Stage2)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage2, &strong(2)).unwrap(),
            (Decision::Progress, TrainingStage::Stage3)
        );
        // Stage 3 is a one-day bridge to the uncoupled task.
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage3, &foraging(&[0.2], &[50.0], 1))
                .unwrap(),
            (Decision::Progress, TrainingStage::StageFinal)
        );
        assert_eq!(
            c.parameters_for(TrainingStage::Stage3)
                .and_then(|p| p.get("task"))
                .and_then(|v| v.as_str()),
            Some(UNCOUPLED_BAITING)
        );
    }

    #[test]
    fn test_uncoupled_baiting_final_rollback_uses_two_sessions() {
        let c = uncoupled_baiting().unwrap();
        // Older sessions are good; the last two average below 300 trials.
        let trials = [600.0, 600.0, 600.0, 250.0, 300.0];
        let eff = [0.8; 5];
        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &foraging(&eff, &trials, 5))
                .unwrap(),
            (Decision::Rollback, TrainingStage::Stage3)
        );
    }

    #[test]
    fn test_uncoupled_no_baiting_uses_stage_4() {
        let c = uncoupled_no_baiting().unwrap();
        assert!(c.stages().contains(&TrainingStage::Stage4));

        // Stage 2 advances on time alone.
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage2, &foraging(&[0.58], &[210.0], 3))
                .unwrap(),
            (Decision::Progress, TrainingStage::Stage3)
        );

        // Stage 3 only rolls back after three sessions.
        let weak = |at_stage| foraging(&[0.4], &[200.0], at_stage);
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage3, &weak(2)).unwrap(),
            (Decision::Stay, TrainingStage::Stage3)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage3, &weak(3)).unwrap(),
            (Decision::Rollback, TrainingStage::Stage2)
        );

        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &foraging(&[0.5; 5], &[400.0; 5], 5))
                .unwrap(),
            (Decision::Rollback, TrainingStage::Stage4)
        );
    }

    #[test]
    fn test_dummy_task_transitions() {
        let c = dummy_task().unwrap();
        assert_eq!(c.entry_stage(), TrainingStage::Stage1);
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage1, &dummy(1.5, 11.0)).unwrap(),
            (Decision::Progress, TrainingStage::StageFinal)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::Stage1, &dummy(0.7, 6.0)).unwrap(),
            (Decision::Progress, TrainingStage::Stage2)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &dummy(0.1, 1.0)).unwrap(),
            (Decision::Rollback, TrainingStage::Stage1)
        );
        assert_eq!(
            c.evaluate_transition(TrainingStage::StageFinal, &dummy(0.1, 9.0)).unwrap(),
            (Decision::Stay, TrainingStage::StageFinal)
        );
    }

    #[test]
    fn test_dummy_metrics_rejected_by_coupled_baiting() {
        let c = coupled_baiting().unwrap();
        assert!(c
            .evaluate_transition(TrainingStage::Stage1, &dummy(1.0, 1.0))
            .is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn stage_strategy() -> impl Strategy<Value = TrainingStage> {
            prop_oneof![
                Just(TrainingStage::Stage1Warmup),
                Just(TrainingStage::Stage1),
                Just(TrainingStage::Stage2),
                Just(TrainingStage::Stage3),
                Just(TrainingStage::StageFinal),
                Just(TrainingStage::Graduated),
            ]
        }

        fn metrics_strategy() -> impl Strategy<Value = DynamicForagingMetrics> {
            (1usize..15, 1u32..10).prop_flat_map(|(len, at_stage)| {
                (
                    prop::collection::vec(0.0f64..1.0, len),
                    prop::collection::vec(0.0f64..1000.0, len),
                )
                    .prop_map(move |(eff, trials)| DynamicForagingMetrics {
                        session_total: len as u32,
                        session_at_current_stage: at_stage,
                        foraging_efficiency: eff,
                        finished_trials: trials,
                    })
            })
        }

        proptest! {
            #[test]
            fn evaluation_is_deterministic(
                stage in stage_strategy(),
                metrics in metrics_strategy(),
            ) {
                let c = coupled_baiting().unwrap();
                let first = c.evaluate_transition(stage, &metrics).unwrap();
                let second = c.evaluate_transition(stage, &metrics).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn graduated_is_absorbing(metrics in metrics_strategy()) {
                let c = coupled_baiting().unwrap();
                prop_assert_eq!(
                    c.evaluate_transition(TrainingStage::Graduated, &metrics).unwrap(),
                    (Decision::Stay, TrainingStage::Graduated)
                );
            }

            #[test]
            fn first_matching_rule_decides(
                stage in stage_strategy(),
                metrics in metrics_strategy(),
            ) {
                prop_assume!(stage != TrainingStage::Graduated);
                let c = coupled_baiting().unwrap();
                let result = c.evaluate_transition(stage, &metrics).unwrap();

                let rules = &c.transitions()[&stage].transition_rules;
                let expected = rules
                    .iter()
                    .find(|rule| rule.condition.evaluate(&metrics).unwrap())
                    .map(|rule| (rule.decision, rule.to_stage))
                    .unwrap_or((Decision::Stay, stage));
                prop_assert_eq!(result, expected);
            }

            #[test]
            fn stay_only_keeps_current_stage(
                stage in stage_strategy(),
                metrics in metrics_strategy(),
            ) {
                let c = coupled_baiting().unwrap();
                let (decision, next) = c.evaluate_transition(stage, &metrics).unwrap();
                if decision == Decision::Stay {
                    prop_assert_eq!(next, stage);
                }
            }
        }
    }
}
