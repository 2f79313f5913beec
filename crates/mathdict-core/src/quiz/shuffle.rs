//! Option shuffling.
//!
//! Each question's options are permuted independently. The answer key is
//! remapped by position, so two options with the same text never confuse
//! which one is correct.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DictError, Result};
use crate::model::QuizQuestion;

/// A question with its options in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShuffledQuestion {
    /// Id of the stored question.
    pub id: Uuid,
    /// Question text.
    pub question: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// Display index of the correct option.
    pub correct: usize,
}

/// Shuffles one question's options.
///
/// # Errors
///
/// Returns [`DictError::CorruptQuestion`] if the stored correct index does
/// not point at an option.
pub fn shuffle_question<R: Rng + ?Sized>(
    question: &QuizQuestion,
    rng: &mut R,
) -> Result<ShuffledQuestion> {
    let corrupt = || DictError::CorruptQuestion {
        question_id: question.id,
        correct: question.correct_answer,
        options: question.options.len(),
    };
    let stored = question.correct_index().ok_or_else(corrupt)?;

    let mut order: Vec<usize> = (0..question.options.len()).collect();
    order.shuffle(rng);

    let correct = order
        .iter()
        .position(|&original| original == stored)
        .ok_or_else(corrupt)?;
    let options = order
        .iter()
        .filter_map(|&original| question.options.get(original).cloned())
        .collect();

    Ok(ShuffledQuestion {
        id: question.id,
        question: question.question.clone(),
        options,
        correct,
    })
}

/// Shuffles a whole question set into an immutable, shareable slice.
///
/// The first corrupt question fails the whole set.
pub fn shuffle_questions<R: Rng + ?Sized>(
    questions: &[QuizQuestion],
    rng: &mut R,
) -> Result<Arc<[ShuffledQuestion]>> {
    questions
        .iter()
        .map(|question| shuffle_question(question, &mut *rng))
        .collect::<Result<Vec<_>>>()
        .map(Arc::from)
}
