//! Daily agreement check-in statements, answered on a 1 to 5 scale
//! (strongly disagree to strongly agree).

use std::ops::RangeInclusive;

pub const SCALE: RangeInclusive<u8> = 1..=5;

pub const SCALE_LABELS: &[&str] = &[
    "Strongly disagree",
    "Disagree",
    "Neutral",
    "Agree",
    "Strongly agree",
];

pub const STATEMENTS: &[&str] = &[
    "We spend enough quality time together.",
    "I feel heard when I bring up something that matters to me.",
    "We share the everyday responsibilities fairly.",
    "I know what my partner is looking forward to this week.",
    "We handle money decisions well together.",
    "I feel comfortable saying no to plans.",
    "We make time to have fun, not just get things done.",
    "I feel appreciated for the small things I do.",
    "We recover quickly after a disagreement.",
    "I feel free to pursue my own interests.",
    "We agree on how much time to spend with others.",
    "I know how to help when my partner is stressed.",
    "We talk about our plans for the future often enough.",
    "Our home feels like a calm place.",
    "I trust that we are on the same team.",
];
