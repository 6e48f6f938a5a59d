use super::types::{Choice, Direction, Question};

pub(crate) fn sample_question(id: &str) -> Question {
    Question {
        id: id.into(),
        text: "How much do you take in at once?".into(),
        dimension: "cognitive_density".into(),
        scene: "forest_edge".into(),
        options: vec![
            Choice {
                label: "One thing".into(),
                direction: Direction::Low,
                trait_label: "focused".into(),
                value: 0.2,
            },
            Choice {
                label: "A few".into(),
                direction: Direction::Mid,
                trait_label: "balanced".into(),
                value: 0.5,
            },
            Choice {
                label: "Everything".into(),
                direction: Direction::High,
                trait_label: "expansive".into(),
                value: 0.8,
            },
        ],
    }
}
