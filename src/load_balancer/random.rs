//! Uniform random load balancing strategy.

use rand::Rng;

use crate::load_balancer::LoadBalancer;

#[derive(Debug, Default)]
pub struct RandomPick;

impl RandomPick {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomPick {
    fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_range_and_reaches_every_slot() {
        let lb = RandomPick::new();
        let mut seen = [false; 3];
        for _ in 0..500 {
            let index = lb.next_index(3).unwrap();
            seen[index] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(lb.next_index(0), None);
    }
}
