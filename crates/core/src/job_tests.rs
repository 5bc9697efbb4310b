use super::*;

#[yare::parameterized(
    created_to_initializing = { JobState::Created, JobState::Initializing, true },
    initializing_to_running = { JobState::Initializing, JobState::Running, true },
    running_to_paused = { JobState::Running, JobState::Paused, true },
    paused_to_initializing = { JobState::Paused, JobState::Initializing, true },
    running_to_completed = { JobState::Running, JobState::Completed, true },
    running_to_failed = { JobState::Running, JobState::Failed, true },
    any_to_stopped = { JobState::Paused, JobState::Stopped, true },
    created_to_running_illegal = { JobState::Created, JobState::Running, false },
    completed_is_absorbing = { JobState::Completed, JobState::Running, false },
    failed_is_absorbing = { JobState::Failed, JobState::Stopped, false },
)]
fn transition_validity(from: JobState, to: JobState, expected: bool) {
    assert_eq!(from.can_transition_to(to), expected);
}

#[test]
fn started_at_set_once_and_never_rewound() {
    let mut job = Job::builder().build();
    assert!(job.transition(JobState::Initializing, 10));
    assert!(job.transition(JobState::Running, 20));
    assert_eq!(job.started_at_ms, Some(20));

    // RUNNING -> PAUSED -> INITIALIZING -> RUNNING again: started_at must not move.
    assert!(job.transition(JobState::Paused, 30));
    assert!(job.transition(JobState::Initializing, 40));
    assert!(job.transition(JobState::Running, 50));
    assert_eq!(job.started_at_ms, Some(20));
}

#[test]
fn timestamps_are_monotonic_through_pause_resume_cycle() {
    let mut job = Job::builder().build();
    job.transition(JobState::Initializing, 1);
    job.transition(JobState::Running, 2);
    job.transition(JobState::Paused, 3);
    job.transition(JobState::Initializing, 4);
    job.transition(JobState::Running, 5);
    job.transition(JobState::Completed, 6);

    assert_eq!(job.created_at_ms, 1_000_000);
    assert!(job.started_at_ms.unwrap() <= job.paused_at_ms.unwrap());
    assert!(job.paused_at_ms.unwrap() <= job.completed_at_ms.unwrap());
}

#[test]
fn illegal_transition_leaves_state_unchanged() {
    let mut job = Job::builder().build();
    assert!(!job.transition(JobState::Completed, 10));
    assert_eq!(job.state, JobState::Created);
}

#[test]
fn stop_reachable_from_any_nonterminal_state() {
    for state in [JobState::Created, JobState::Initializing, JobState::Running, JobState::Paused] {
        assert!(state.can_transition_to(JobState::Stopped));
    }
}

#[test]
fn terminal_states_are_absorbing() {
    for terminal in [JobState::Completed, JobState::Failed, JobState::Stopped] {
        for next in [JobState::Created, JobState::Initializing, JobState::Running, JobState::Paused, JobState::Completed, JobState::Failed, JobState::Stopped]
        {
            assert!(!terminal.can_transition_to(next));
        }
    }
}
