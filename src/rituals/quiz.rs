//! Daily quiz question bank. Each partner answers for themselves and
//! guesses what the other picked.

pub struct QuizQuestion {
    pub text: &'static str,
    pub options: &'static [&'static str],
}

pub const QUESTIONS: &[QuizQuestion] = &[
    QuizQuestion {
        text: "Ideal way to spend a free evening?",
        options: &["Cozy night in", "Dinner out", "Seeing friends", "Something active"],
    },
    QuizQuestion {
        text: "Which season feels most like you?",
        options: &["Spring", "Summer", "Autumn", "Winter"],
    },
    QuizQuestion {
        text: "Best way to cheer up after a hard day?",
        options: &["Talk it through", "Quiet time alone", "A good meal", "A distraction"],
    },
    QuizQuestion {
        text: "Dream vacation?",
        options: &["Beach", "Mountains", "Big city", "Road trip"],
    },
    QuizQuestion {
        text: "Morning person or night owl?",
        options: &["Early bird", "Night owl", "Depends on the day"],
    },
    QuizQuestion {
        text: "Favorite kind of gift to receive?",
        options: &["Something handmade", "An experience", "Something practical", "A surprise"],
    },
    QuizQuestion {
        text: "How do you prefer to plan a weekend?",
        options: &["Every hour planned", "A rough outline", "Totally spontaneous"],
    },
    QuizQuestion {
        text: "Comfort food of choice?",
        options: &["Pizza", "Pasta", "Soup", "Something sweet"],
    },
    QuizQuestion {
        text: "What recharges you the most?",
        options: &["Sleep", "Nature", "Music", "Time with people"],
    },
    QuizQuestion {
        text: "Which superpower would you pick?",
        options: &["Flying", "Invisibility", "Teleporting", "Reading minds"],
    },
    QuizQuestion {
        text: "How do you handle disagreements?",
        options: &["Talk right away", "Cool off first", "Write it down", "Let it go"],
    },
    QuizQuestion {
        text: "Preferred way to stay in touch during the day?",
        options: &["Texts", "Calls", "Memes", "Not much, catch up later"],
    },
    QuizQuestion {
        text: "Pick a movie genre for tonight.",
        options: &["Comedy", "Drama", "Thriller", "Documentary"],
    },
    QuizQuestion {
        text: "What feels most like being loved?",
        options: &["Kind words", "Quality time", "Help with tasks", "Physical affection", "Thoughtful gifts"],
    },
    QuizQuestion {
        text: "Which chore would you happily never do again?",
        options: &["Dishes", "Laundry", "Vacuuming", "Grocery shopping"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_question_offers_a_real_choice() {
        assert!(QUESTIONS.len() >= crate::rituals::games::ITEMS_PER_DAY);
        for question in QUESTIONS {
            assert!(question.options.len() >= 2, "{}", question.text);
            assert!(question.options.len() <= u8::MAX as usize);
        }
    }
}
