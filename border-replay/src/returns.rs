//! Estimation of returns from stored episodes.
//!
//! Both estimators read rewards and episode links through [`EpisodicBuffer`], so
//! they work on a single [`TransitionStore`](crate::replay_buffer::TransitionStore)
//! as well as on the vector and prioritized buffers. Critic values are supplied by
//! the caller.
//!
//! The successor value of a step is used only where [`value_mask`] is `true`:
//! a terminated step has no successor, while a truncated step or the latest step of
//! an unfinished episode bootstraps from the value of its `next_obs`.
use crate::{
    error::{ReplayBufferError, Result},
    EpisodicBuffer,
};
use log::trace;

fn check_discount(v: f32) -> Result<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ReplayBufferError::InvalidDiscount(v))
    }
}

fn check_indices<B: EpisodicBuffer + ?Sized>(buffer: &B, indices: &[usize]) -> Result<()> {
    match indices.iter().find(|&&ix| !buffer.contains(ix)) {
        Some(&index) => Err(ReplayBufferError::OutOfRange {
            index,
            len: buffer.len(),
        }),
        None => Ok(()),
    }
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(ReplayBufferError::ShapeMismatch { expected, got })
    }
}

/// Returns whether the successor value of each step is bootstrapped.
///
/// The mask is `is_truncated || !is_terminated`.
pub fn value_mask<B: EpisodicBuffer + ?Sized>(buffer: &B, indices: &[usize]) -> Result<Vec<bool>> {
    check_indices(buffer, indices)?;
    Ok(indices
        .iter()
        .map(|&ix| buffer.is_truncated(ix) || !buffer.is_terminated(ix))
        .collect())
}

/// Computes n-step returns of the steps at `indices`.
///
/// For each step, up to `n_step` rewards are accumulated along the episode as
/// $\sum_k \gamma^k r_{t+k}$, stopping early at the end of the episode or at the
/// latest stored step. The value of the last step reached is then added with the
/// factor $\gamma^{steps}$ when it is not terminated.
///
/// `target_value_fn` is called once with the indices of the last steps and must
/// return the value of `next_obs` at each of them.
pub fn compute_nstep_return<B, F>(
    buffer: &B,
    indices: &[usize],
    target_value_fn: F,
    gamma: f32,
    n_step: usize,
) -> Result<Vec<f32>>
where
    B: EpisodicBuffer + ?Sized,
    F: FnOnce(&[usize]) -> Vec<f32>,
{
    check_discount(gamma)?;
    if n_step == 0 {
        return Err(ReplayBufferError::InvalidHorizon(n_step));
    }
    check_indices(buffer, indices)?;

    let mut returns = Vec::with_capacity(indices.len());
    let mut discounts = Vec::with_capacity(indices.len());
    let mut last_indices = Vec::with_capacity(indices.len());

    for &start in indices {
        let mut ix = start;
        let mut ret = 0f32;
        let mut discount = 1f32;
        let mut steps = 0;
        loop {
            ret += discount * buffer.reward(ix);
            discount *= gamma;
            steps += 1;
            if steps == n_step || buffer.is_done(ix) {
                break;
            }
            match buffer.next_in_episode(ix) {
                Some(next) => ix = next,
                None => break,
            }
        }
        returns.push(ret);
        discounts.push(discount);
        last_indices.push(ix);
    }

    let target_values = target_value_fn(&last_indices);
    check_len(indices.len(), target_values.len())?;
    let mask = value_mask(buffer, &last_indices)?;

    for (ret, ((m, d), v)) in returns
        .iter_mut()
        .zip(mask.iter().zip(discounts.iter()).zip(target_values.iter()))
    {
        if *m {
            *ret += d * v;
        }
    }
    trace!("n-step returns of {} samples", returns.len());

    Ok(returns)
}

/// Computes returns and advantages with generalized advantage estimation.
///
/// `indices` is typically the whole buffer in storage order, e.g. `ix_sample` of
/// a batch taken with size 0. `v_s` and `v_s_` are the values of `obs` and
/// `next_obs` at these indices.
///
/// With $\delta_t = r_t + \gamma m_t V(s_{t+1}) - V(s_t)$, where $m_t$ is the
/// [`value_mask`], the advantage is $A_t = \delta_t + \gamma \lambda A_{t+1}$ if
/// `indices[t + 1]` follows `indices[t]` in the same episode, and $A_t = \delta_t$
/// otherwise. Returns are $A_t + V(s_t)$.
pub fn compute_episodic_return<B: EpisodicBuffer + ?Sized>(
    buffer: &B,
    indices: &[usize],
    v_s_: &[f32],
    v_s: &[f32],
    gamma: f32,
    gae_lambda: f32,
) -> Result<(Vec<f32>, Vec<f32>)> {
    check_discount(gamma)?;
    check_discount(gae_lambda)?;
    check_len(indices.len(), v_s_.len())?;
    check_len(indices.len(), v_s.len())?;
    let mask = value_mask(buffer, indices)?;

    let n = indices.len();
    let mut advantages = vec![0f32; n];
    let mut gae = 0f32;

    for t in (0..n).rev() {
        let bootstrap = if mask[t] { gamma * v_s_[t] } else { 0.0 };
        let delta = buffer.reward(indices[t]) + bootstrap - v_s[t];
        let linked = t + 1 < n && buffer.next_in_episode(indices[t]) == Some(indices[t + 1]);
        gae = if linked {
            delta + gamma * gae_lambda * gae
        } else {
            delta
        };
        advantages[t] = gae;
    }

    let returns = advantages
        .iter()
        .zip(v_s.iter())
        .map(|(a, v)| a + v)
        .collect();

    Ok((returns, advantages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{replay_buffer::TransitionStore, Transition};

    fn approx(xs: &[f32], ys: &[f32]) -> bool {
        xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    /// 10 steps of reward 1, the last one ends the episode.
    fn episode(terminated: bool) -> TransitionStore<i32, i32> {
        let trs = (0..10).map(|i| {
            Transition::new(i, 0, 1.0, i + 1)
                .terminated(terminated && i == 9)
                .truncated(!terminated && i == 9)
        });
        TransitionStore::from_transitions(10, trs).unwrap()
    }

    #[test]
    fn test_gae_of_terminated_episode() {
        let store = episode(true);
        let ixs = store.indices();
        let zeros = vec![0.0; 10];
        let (returns, _) = compute_episodic_return(&store, &ixs, &zeros, &zeros, 1.0, 1.0).unwrap();
        let expected = (0..10).map(|i| (10 - i) as f32).collect::<Vec<_>>();
        assert!(approx(&returns, &expected));
    }

    #[test]
    fn test_gae_bootstraps_truncated_step() {
        let store = episode(false);
        let ixs = store.indices();
        let zeros = vec![0.0; 10];
        let mut v_s_ = zeros.clone();
        v_s_[9] = 5.0;
        let (returns, _) = compute_episodic_return(&store, &ixs, &v_s_, &zeros, 1.0, 1.0).unwrap();
        assert!((returns[9] - 6.0).abs() < 1e-5);
        assert!((returns[0] - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_gae_with_lambda_one_is_sum_of_td_residuals() {
        let store = episode(true);
        let ixs = store.indices();
        let gamma = 0.9f32;
        let v_s = (0..10).map(|i| 0.1 * i as f32).collect::<Vec<_>>();
        let v_s_ = (0..10).map(|i| 0.1 * (i + 1) as f32).collect::<Vec<_>>();
        let (_, advantages) =
            compute_episodic_return(&store, &ixs, &v_s_, &v_s, gamma, 1.0).unwrap();

        let deltas = (0..10)
            .map(|t| {
                let m = if t == 9 { 0.0 } else { 1.0 };
                1.0 + gamma * m * v_s_[t] - v_s[t]
            })
            .collect::<Vec<_>>();
        let expected = (0..10)
            .map(|t| {
                (t..10)
                    .map(|k| gamma.powi((k - t) as i32) * deltas[k])
                    .sum::<f32>()
            })
            .collect::<Vec<_>>();
        assert!(approx(&advantages, &expected));
    }

    #[test]
    fn test_gae_does_not_cross_episodes() {
        let trs = (0..4).map(|i| Transition::new(i, 0, 1.0, i + 1).terminated(i == 1));
        let store = TransitionStore::from_transitions(4, trs).unwrap();
        let zeros = vec![0.0; 4];
        let v_s_ = vec![10.0; 4];
        let (returns, _) =
            compute_episodic_return(&store, &[0, 1, 2, 3], &v_s_, &zeros, 1.0, 1.0).unwrap();
        // The second episode is unfinished and bootstraps at its latest step.
        assert!(approx(&returns, &[12.0, 1.0, 22.0, 11.0]));

        // Out of order indices are not linked.
        let (returns, _) =
            compute_episodic_return(&store, &[3, 2], &v_s_[..2], &zeros[..2], 1.0, 1.0).unwrap();
        assert!(approx(&returns, &[11.0, 11.0]));
    }

    #[test]
    fn test_value_mask() {
        let trs = vec![
            Transition::new(0, 0, 0.0, 1).terminated(true),
            Transition::new(1, 0, 0.0, 2).truncated(true),
            Transition::new(2, 0, 0.0, 3),
        ];
        let store = TransitionStore::from_transitions(3, trs).unwrap();
        assert_eq!(
            value_mask(&store, &[0, 1, 2]).unwrap(),
            vec![false, true, true]
        );
    }

    #[test]
    fn test_nstep_reduces_to_monte_carlo() {
        let store = episode(true);
        let gamma = 0.5f32;
        let returns = compute_nstep_return(&store, &[0, 7], |ixs| vec![100.0; ixs.len()], gamma, 20)
            .unwrap();
        let mc = |t: usize| (t..10).map(|k| gamma.powi((k - t) as i32)).sum::<f32>();
        assert!(approx(&returns, &[mc(0), mc(7)]));
    }

    #[test]
    fn test_nstep_bootstraps_at_horizon() {
        let store = episode(false);
        let gamma = 0.9f32;
        let mut called = Vec::new();
        let returns = compute_nstep_return(
            &store,
            &[0, 8],
            |ixs| {
                called.extend_from_slice(ixs);
                ixs.iter().map(|&ix| ix as f32).collect()
            },
            gamma,
            3,
        )
        .unwrap();
        assert_eq!(called, vec![2, 9]);
        let r0 = 1.0 + gamma + gamma.powi(2) + gamma.powi(3) * 2.0;
        // Truncated at slot 9 after two steps.
        let r8 = 1.0 + gamma + gamma.powi(2) * 9.0;
        assert!(approx(&returns, &[r0, r8]));
    }

    #[test]
    fn test_nstep_on_unfinished_tail() {
        let trs = (0..3).map(|i| Transition::new(i, 0, 1.0, i + 1));
        let store = TransitionStore::from_transitions(3, trs).unwrap();
        let returns = compute_nstep_return(&store, &[1], |_| vec![4.0], 1.0, 5).unwrap();
        assert!(approx(&returns, &[6.0]));
    }

    #[test]
    fn test_errors() {
        let store = episode(true);
        let zeros = vec![0.0; 2];
        assert_eq!(
            compute_episodic_return(&store, &[0, 1], &zeros, &zeros, 1.5, 0.9),
            Err(ReplayBufferError::InvalidDiscount(1.5))
        );
        assert!(matches!(
            compute_episodic_return(&store, &[0, 1], &zeros, &zeros, 0.9, f32::NAN),
            Err(ReplayBufferError::InvalidDiscount(_))
        ));
        assert_eq!(
            compute_episodic_return(&store, &[0, 1], &zeros[..1], &zeros, 0.9, 0.9),
            Err(ReplayBufferError::ShapeMismatch {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            compute_nstep_return(&store, &[0], |_| vec![0.0], 0.9, 0),
            Err(ReplayBufferError::InvalidHorizon(0))
        );
        assert_eq!(
            compute_nstep_return(&store, &[0], |_| vec![], 0.9, 1),
            Err(ReplayBufferError::ShapeMismatch {
                expected: 1,
                got: 0
            })
        );

        let trs = (0..2).map(|i| Transition::new(i, 0, 1.0, i + 1));
        let store = TransitionStore::from_transitions(4, trs).unwrap();
        assert_eq!(
            value_mask(&store, &[0, 3]),
            Err(ReplayBufferError::OutOfRange { index: 3, len: 2 })
        );
    }
}
