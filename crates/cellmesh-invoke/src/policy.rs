//! `ExceptionPolicy` (spec.md §4.1 / §2's 5% component).

use cellmesh_types::Fault;

/// What an invocation should do next after classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Recoverable — re-dispatch, budget permitting.
    Retry,
    /// The operation asked to keep waiting (wait-aware ops).
    ContinueWait,
    /// Terminal — the fault becomes the invocation's result.
    Throw,
}

/// Given a failure and how much retry budget remains, decides
/// {RETRY, CONTINUE_WAIT, THROW}. Spec.md notes that invocation
/// subclasses refine this per operation family (partition-bound vs
/// target-bound); modelled here as two concrete policies rather than an
/// inheritance hierarchy (spec.md §9 design notes).
pub trait ExceptionPolicy: Send + Sync {
    fn classify(&self, fault: &Fault, invoke_count: u64, try_count: u64) -> PolicyDecision;
}

fn has_retry_budget(invoke_count: u64, try_count: u64) -> bool {
    invoke_count < try_count
}

/// Policy for invocations bound to a `(partition_id, replica_index)`.
/// The target is re-resolved on every attempt, so a stale address
/// (`WrongTarget`) or a replica that hasn't caught up yet
/// (`TargetNotMember`) are both expected transients while the cluster
/// converges.
#[derive(Debug, Default)]
pub struct PartitionExceptionPolicy;

impl ExceptionPolicy for PartitionExceptionPolicy {
    fn classify(&self, fault: &Fault, invoke_count: u64, try_count: u64) -> PolicyDecision {
        match fault {
            Fault::ContinueWait => PolicyDecision::ContinueWait,
            Fault::RetryableIo(_) | Fault::WrongTarget | Fault::TargetNotMember
                if has_retry_budget(invoke_count, try_count) =>
            {
                PolicyDecision::Retry
            }
            _ => PolicyDecision::Throw,
        }
    }
}

/// Policy for invocations bound to an explicit address. The caller
/// picked that address deliberately, so a `WrongTarget` resolution
/// failure (which for a targeted invocation only happens if the engine
/// itself can't place the address) is treated as fatal rather than
/// retried — retrying would just spin against the same bad address.
#[derive(Debug, Default)]
pub struct TargetExceptionPolicy;

impl ExceptionPolicy for TargetExceptionPolicy {
    fn classify(&self, fault: &Fault, invoke_count: u64, try_count: u64) -> PolicyDecision {
        match fault {
            Fault::ContinueWait => PolicyDecision::ContinueWait,
            Fault::WrongTarget => PolicyDecision::Throw,
            Fault::RetryableIo(_) | Fault::TargetNotMember
                if has_retry_budget(invoke_count, try_count) =>
            {
                PolicyDecision::Retry
            }
            _ => PolicyDecision::Throw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Fault::RetryableIo("x".into()), 0, 3 => PolicyDecision::Retry; "io failure within budget retries")]
    #[test_case(Fault::TargetNotMember, 0, 3 => PolicyDecision::Retry; "target not yet a member retries")]
    #[test_case(Fault::WrongTarget, 0, 3 => PolicyDecision::Retry; "wrong target retries under partition policy")]
    #[test_case(Fault::ContinueWait, 0, 3 => PolicyDecision::ContinueWait; "wait-aware op keeps waiting")]
    #[test_case(Fault::IllegalState("x".into()), 0, 3 => PolicyDecision::Throw; "illegal state is always fatal")]
    #[test_case(Fault::RetryableIo("x".into()), 3, 3 => PolicyDecision::Throw; "io failure past budget throws")]
    fn partition_policy_classifies(fault: Fault, invoke_count: u64, try_count: u64) -> PolicyDecision {
        PartitionExceptionPolicy.classify(&fault, invoke_count, try_count)
    }

    #[test]
    fn retries_within_budget() {
        let policy = PartitionExceptionPolicy;
        let decision = policy.classify(&Fault::RetryableIo("boom".into()), 1, 3);
        assert_eq!(decision, PolicyDecision::Retry);
    }

    #[test]
    fn throws_once_budget_exhausted() {
        let policy = PartitionExceptionPolicy;
        let decision = policy.classify(&Fault::RetryableIo("boom".into()), 3, 3);
        assert_eq!(decision, PolicyDecision::Throw);
    }

    #[test]
    fn targeted_policy_treats_wrong_target_as_fatal() {
        let policy = TargetExceptionPolicy;
        assert_eq!(
            policy.classify(&Fault::WrongTarget, 0, 5),
            PolicyDecision::Throw
        );
    }

    #[test]
    fn illegal_state_is_always_fatal() {
        let policy = PartitionExceptionPolicy;
        assert_eq!(
            policy.classify(&Fault::IllegalState("bad".into()), 0, 5),
            PolicyDecision::Throw
        );
    }
}
