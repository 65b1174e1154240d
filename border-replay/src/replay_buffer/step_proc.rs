//! A generic implementation of [`StepProcessor`](crate::StepProcessor).
use crate::{Env, Info, Step, StepProcessor, Transition};
use std::marker::PhantomData;

/// Configuration of [`SimpleStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct SimpleStepProcessorConfig {}

/// Turns [`Step`]s of a single environment into [`Transition`]s.
///
/// The processor keeps the previous observation, which becomes the `obs` of the
/// next transition. When an episode ends, it is replaced with the initial
/// observation of the next episode carried by [`Step::init_obs`].
pub struct SimpleStepProcessor<E, O, A> {
    prev_obs: Option<O>,
    phantom: PhantomData<(E, A)>,
}

impl<E, O, A> StepProcessor<E> for SimpleStepProcessor<E, O, A>
where
    E: Env,
    O: Clone + From<E::Obs>,
    A: From<E::Act>,
{
    type Config = SimpleStepProcessorConfig;
    type Output = Transition<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    fn reset(&mut self, init_obs: E::Obs) {
        self.prev_obs = Some(init_obs.into());
    }

    fn process(&mut self, step: Step<E>) -> Self::Output {
        let is_done = step.is_done();
        let truncated_override = step.info.truncated_override();
        let next_obs: O = step.obs.into();
        let obs = match self.prev_obs.replace(next_obs.clone()) {
            Some(obs) => obs,
            None => panic!("prev_obs is not set. Forgot to call reset()?"),
        };

        if is_done {
            match step.init_obs {
                Some(init_obs) => self.prev_obs = Some(init_obs.into()),
                None => panic!("init_obs is not set at the end of an episode"),
            }
        }

        Transition::new(obs, step.act.into(), step.reward, next_obs)
            .terminated(step.is_terminated)
            .truncated(step.is_truncated)
            .truncated_override(truncated_override)
    }
}
