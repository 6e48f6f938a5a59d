use crate::document::{Choice, Direction, Question};

fn choice(label: &str, direction: Direction, trait_label: &str) -> Choice {
    let value = match direction {
        Direction::Low => 0.2,
        Direction::Mid => 0.5,
        Direction::High => 0.8,
    };
    Choice {
        label: label.into(),
        direction,
        trait_label: trait_label.into(),
        value,
    }
}

fn question(id: &str, text: &str, dimension: &str, scene: &str, options: [Choice; 3]) -> Question {
    Question {
        id: id.into(),
        text: text.into(),
        dimension: dimension.into(),
        scene: scene.into(),
        options: options.into(),
    }
}

/// The eight calibration questions, one per profile dimension.
pub fn default_questions() -> Vec<Question> {
    use Direction::{High, Low, Mid};
    vec![
        question(
            "load",
            "How much can you hold at once\nbefore it starts to blur?",
            "cognitive_density",
            "forest_edge",
            [
                choice("Not much. One thing at a time.", Low, "focused"),
                choice("Quite a lot. I can hold complexity.", High, "parallel"),
                choice("It varies. Some days more than others.", Mid, "adaptive"),
            ],
        ),
        question(
            "pace",
            "When you're working on something\nthat matters to you...",
            "processing_pace",
            "forest_path",
            [
                choice("I go deep. Hours disappear.", Low, "hyperfocus"),
                choice("I take breaks. Steady rhythm.", High, "sustainable"),
                choice("Bursts of intensity, then rest.", Mid, "cyclical"),
            ],
        ),
        question(
            "uncertainty",
            "When facing the unknown...",
            "uncertainty_tolerance",
            "misty_clearing",
            [
                choice("I need a plan before I move.", Low, "structured"),
                choice("I explore. The path reveals itself.", High, "emergent"),
                choice("I sketch a direction, then adapt.", Mid, "iterative"),
            ],
        ),
        question(
            "feedback",
            "How do you know\nyou're on the right track?",
            "guidance_frequency",
            "ancient_tree",
            [
                choice("External validation. Others confirm.", High, "external"),
                choice("Internal sense. I just know.", Low, "internal"),
                choice("Results. The work speaks.", Mid, "empirical"),
            ],
        ),
        question(
            "recovery",
            "After intense effort,\nwhat restores you?",
            "home_altitude",
            "quiet_stream",
            [
                choice("Solitude. Silence. Nothing.", Low, "solitary"),
                choice("Connection. People. Talk.", High, "social"),
                choice("Movement. Change of scene.", Mid, "kinetic"),
            ],
        ),
        question(
            "starting",
            "Beginning something new...",
            "default_paradigm",
            "dawn_ridge",
            [
                choice("Is hard. I circle before landing.", Low, "cautious"),
                choice("Is exciting. I dive in.", High, "eager"),
                choice("Depends on whether I chose it.", Mid, "autonomous"),
            ],
        ),
        question(
            "completion",
            "When something is 'done'...",
            "feedback_style",
            "summit_view",
            [
                choice("I know exactly when. Clean edges.", Low, "definitive"),
                choice("It's never quite done. Always more.", High, "perfectionist"),
                choice("Done enough to ship. Move on.", Mid, "pragmatic"),
            ],
        ),
        question(
            "essence",
            "At your core,\nyou are someone who...",
            "tangent_tolerance",
            "mirror_pool",
            [
                choice("Builds. Makes things exist.", Low, "builder"),
                choice("Connects. Sees relationships.", Mid, "connector"),
                choice("Discovers. Follows curiosity.", High, "explorer"),
            ],
        ),
    ]
}

/// Fixed question used by `test-question`.
pub fn sample_question() -> Question {
    question(
        "test",
        "This is a test question from hostbridge",
        "test_dimension",
        "test_scene",
        [
            choice("Option A (low)", Direction::Low, "test_a"),
            choice("Option B (mid)", Direction::Mid, "test_b"),
            choice("Option C (high)", Direction::High, "test_c"),
        ],
    )
}
