//! Guided-script stepping.
//!
//! Each step holds a question and its scripted answers. Advancing a step
//! injects the operator's affirmative, then reveals one combined message:
//! the step's answers (numbered when there are several) with the next
//! question appended, carrying a button that advances to that next step.
//! The reveal happens after a short delay; callers schedule the returned
//! content rather than appending it immediately.

use crate::chat::{text, Action, ActionData, ChatButton};
use crate::models::Step;

/// Content and buttons of a revealed step message.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReveal {
    pub content: String,
    pub buttons: Vec<ChatButton>,
    /// True when the script has no further steps.
    pub terminal: bool,
}

/// Combine a step's answers: a single answer stands alone, several are
/// numbered and blank-line separated.
pub fn combined_answers(step: &Step) -> String {
    if step.answers.len() == 1 {
        step.answers[0].clone()
    } else {
        step.answers
            .iter()
            .enumerate()
            .map(|(i, answer)| format!("{}. {answer}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn advance_button(steps: &[Step], next_index: usize) -> ChatButton {
    ChatButton::with_data(
        text::YES,
        Action::NextStep,
        ActionData {
            steps: Some(steps.to_vec()),
            current_step_index: Some(next_index),
            message: None,
        },
    )
}

/// Reveal the message for `steps[index]`. Returns `None` when the index is
/// out of range.
pub fn reveal(steps: &[Step], index: usize) -> Option<StepReveal> {
    let step = steps.get(index)?;
    let mut content = combined_answers(step);
    let next_index = index + 1;
    if let Some(next) = steps.get(next_index) {
        content.push_str("\n\n");
        content.push_str(&next.question);
        Some(StepReveal {
            content,
            buttons: vec![advance_button(steps, next_index)],
            terminal: false,
        })
    } else {
        Some(StepReveal {
            content,
            buttons: Vec::new(),
            terminal: true,
        })
    }
}

/// Initial message for a popup opened with a script: the first step's
/// answers, with the second step's question appended when it exists.
pub fn initial_reveal(steps: &[Step]) -> Option<StepReveal> {
    reveal(steps, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(question: &str, answers: &[&str]) -> Step {
        Step {
            question: question.to_string(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn single_answer_is_bare() {
        let steps = vec![step("q1", &["A"]), step("q2", &["B"])];
        let reveal = reveal(&steps, 0).unwrap();
        assert_eq!(reveal.content, "A\n\nq2");
        assert!(!reveal.terminal);
        let button = &reveal.buttons[0];
        assert_eq!(button.label, text::YES);
        assert_eq!(button.action, Action::NextStep);
        assert_eq!(
            button.data.as_ref().unwrap().current_step_index,
            Some(1)
        );
    }

    #[test]
    fn multiple_answers_are_numbered() {
        let steps = vec![step("q1", &["B1", "B2"])];
        let reveal = reveal(&steps, 0).unwrap();
        assert_eq!(reveal.content, "1. B1\n\n2. B2");
        assert!(reveal.terminal);
        assert!(reveal.buttons.is_empty());
    }

    #[test]
    fn out_of_range_index_reveals_nothing() {
        let steps = vec![step("q1", &["A"])];
        assert!(reveal(&steps, 3).is_none());
        assert!(reveal(&[], 0).is_none());
    }

    #[test]
    fn walking_a_three_step_script() {
        let steps = vec![
            step("q1", &["A"]),
            step("q2", &["B1", "B2"]),
            step("q3", &["C"]),
        ];
        let first = initial_reveal(&steps).unwrap();
        assert_eq!(first.content, "A\n\nq2");
        let second = reveal(&steps, 1).unwrap();
        assert_eq!(second.content, "1. B1\n\n2. B2\n\nq3");
        let third = reveal(&steps, 2).unwrap();
        assert_eq!(third.content, "C");
        assert!(third.terminal);
    }
}
