//! Experience replay buffer for external trainers

use std::collections::VecDeque;

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::state::{Observation, Reward, OBSERVATION_DIM};

/// A single transition (s, a, r, s', terminated, truncated)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub observation: Observation,
    pub action: u8,
    pub reward: Reward,
    pub next_observation: Observation,
    pub terminated: bool,
    pub truncated: bool,
}

impl Experience {
    /// Create a new experience
    pub fn new(
        observation: Observation,
        action: u8,
        reward: Reward,
        next_observation: Observation,
        terminated: bool,
        truncated: bool,
    ) -> Self {
        Self {
            observation,
            action,
            reward,
            next_observation,
            terminated,
            truncated,
        }
    }

    /// Episode ended on this transition
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Column-major view of a batch, ready for a learner
#[derive(Debug, Clone)]
pub struct Batch {
    pub observations: Array2<f64>,
    pub actions: Array1<u8>,
    pub rewards: Array1<f64>,
    pub next_observations: Array2<f64>,
    pub dones: Array1<bool>,
}

impl Batch {
    pub fn from_experiences(experiences: &[Experience]) -> Self {
        let n = experiences.len();
        Self {
            observations: Array2::from_shape_fn((n, OBSERVATION_DIM), |(i, j)| {
                experiences[i].observation.0[j]
            }),
            actions: experiences.iter().map(|e| e.action).collect(),
            rewards: experiences.iter().map(|e| e.reward).collect(),
            next_observations: Array2::from_shape_fn((n, OBSERVATION_DIM), |(i, j)| {
                experiences[i].next_observation.0[j]
            }),
            dones: experiences.iter().map(Experience::done).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Bounded FIFO of transitions; the oldest falls out first
pub struct ExperienceBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ExperienceBuffer {
    /// Create a new experience buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add an experience to the buffer
    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Sample a batch without replacement using the caller's random source
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Experience> {
        let experiences: Vec<_> = self.buffer.iter().collect();
        experiences
            .choose_multiple(rng, batch_size.min(experiences.len()))
            .map(|e| (*e).clone())
            .collect()
    }

    /// Sample straight into array form
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Batch {
        Batch::from_experiences(&self.sample(batch_size, rng))
    }

    /// Get buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get all experiences, oldest first
    pub fn all(&self) -> Vec<Experience> {
        self.buffer.iter().cloned().collect()
    }

    /// Every stored transition as arrays
    pub fn to_batch(&self) -> Batch {
        Batch::from_experiences(&self.all())
    }
}

impl Default for ExperienceBuffer {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn create_test_experience(i: usize) -> Experience {
        let mut values = [0.0; OBSERVATION_DIM];
        values[3] = i as f64;
        let observation = Observation(values);
        values[3] += 1.0;
        Experience::new(observation, (i % 8) as u8, -(i as f64), Observation(values), false, false)
    }

    #[test]
    fn test_buffer_push_and_len() {
        let mut buffer = ExperienceBuffer::new(100);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());

        buffer.push(create_test_experience(0));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_buffer_capacity_drops_oldest() {
        let mut buffer = ExperienceBuffer::new(3);

        for i in 0..5 {
            buffer.push(create_test_experience(i));
        }

        // Should be capped at capacity
        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f64> = buffer.all().iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![-2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut buffer = ExperienceBuffer::new(0);
        buffer.push(create_test_experience(0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_sample_is_seeded() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..10 {
            buffer.push(create_test_experience(i));
        }

        let a = buffer.sample(5, &mut ChaCha8Rng::seed_from_u64(7));
        let b = buffer.sample(5, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_buffer_sample_larger_than_buffer() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..3 {
            buffer.push(create_test_experience(i));
        }

        let sample = buffer.sample(10, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(sample.len(), 3);
    }

    #[test]
    fn test_batch_shapes() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..4 {
            buffer.push(create_test_experience(i));
        }
        let mut last = create_test_experience(4);
        last.truncated = true;
        buffer.push(last);

        let batch = buffer.to_batch();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.observations.shape(), &[5, OBSERVATION_DIM]);
        assert_eq!(batch.next_observations.shape(), &[5, OBSERVATION_DIM]);
        assert_eq!(batch.observations[[2, 3]], 2.0);
        assert_eq!(batch.next_observations[[2, 3]], 3.0);
        assert_eq!(batch.actions[4], 4);
        assert!(batch.dones[4]);
        assert!(!batch.dones[0]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = ExperienceBuffer::default();
        buffer.push(create_test_experience(1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 10000);
    }
}
