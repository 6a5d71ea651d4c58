//! Tests for target stack ordering, displacement, and dispatch defaults.

mod common;

use common::{FakeTarget, new_session, process_builder, raw_value};
use strata_core::exception::ErrorKind;
use strata_core::target::{Provider, ResumeRequest, Stratum, TargetOp, WaitStatus};
use strata_core::types::{ProcessId, RegisterId, ThreadId};

#[test]
fn test_empty_stack_bottoms_out_at_the_dummy()
{
    let session = new_session();
    assert_eq!(session.target_depth(), 1);
    assert_eq!(session.top_stratum(), Stratum::Dummy);
    assert_eq!(session.top_shortname(), "none");
}

#[test]
fn test_push_orders_targets_by_stratum()
{
    let mut session = new_session();
    let file = session.register_target(Box::new(
        FakeTarget::builder("fake-file", Stratum::File).finish(),
    ));
    let process = session.register_target(Box::new(process_builder(0).finish()));

    // Pushing the lower stratum second must still leave the process on top.
    assert!(session.push_target(process).unwrap());
    assert!(!session.push_target(file).unwrap());

    assert_eq!(session.target_depth(), 3);
    assert_eq!(session.top_stratum(), Stratum::Process);
}

#[test]
fn test_push_displaces_the_same_stratum_occupant()
{
    let mut session = new_session();
    let first = process_builder(100).finish();
    let first_counters = first.counters();
    let second = process_builder(200).finish();
    let second_counters = second.counters();

    let first_id = session.register_target(Box::new(first));
    let second_id = session.register_target(Box::new(second));

    session.push_target(first_id).unwrap();
    session.push_target(second_id).unwrap();

    assert_eq!(first_counters.borrow().closes, 1);
    assert_eq!(session.target_depth(), 2);

    // Register traffic now routes to the replacement.
    let bytes = session.read_register(ThreadId(1), RegisterId(0)).unwrap();
    assert_eq!(bytes.as_slice(), &raw_value(200, 0));

    // A displaced target may be pushed again later.
    session.push_target(first_id).unwrap();
    assert_eq!(second_counters.borrow().closes, 1);
}

#[test]
fn test_pop_closes_the_top_target()
{
    let mut session = new_session();
    let target = process_builder(0).finish();
    let counters = target.counters();
    let id = session.register_target(Box::new(target));

    session.push_target(id).unwrap();
    assert_eq!(session.pop_target().unwrap(), id);

    assert_eq!(counters.borrow().closes, 1);
    assert_eq!(session.target_depth(), 1);
    assert_eq!(session.top_shortname(), "none");
}

#[test]
fn test_pop_with_only_the_sentinel_is_internal()
{
    let mut session = new_session();
    let error = session.pop_target().unwrap_err();
    assert!(error.is_internal());
}

#[test]
fn test_unpush_removes_a_buried_target()
{
    let mut session = new_session();
    let file = FakeTarget::builder("fake-file", Stratum::File).finish();
    let file_counters = file.counters();
    let file_id = session.register_target(Box::new(file));
    let process_id = session.register_target(Box::new(process_builder(0).finish()));

    session.push_target(file_id).unwrap();
    session.push_target(process_id).unwrap();

    session.unpush_target(file_id).unwrap();
    assert_eq!(file_counters.borrow().closes, 1);
    assert_eq!(session.target_depth(), 2);
    assert_eq!(session.top_stratum(), Stratum::Process);
}

#[test]
fn test_unpush_of_an_inactive_target_is_internal()
{
    let mut session = new_session();
    let id = session.register_target(Box::new(process_builder(0).finish()));
    let error = session.unpush_target(id).unwrap_err();
    assert!(error.is_internal());
}

#[test]
fn test_push_at_the_reserved_stratum_is_rejected()
{
    let mut session = new_session();
    let id = session.register_target(Box::new(
        FakeTarget::builder("impostor", Stratum::Dummy).finish(),
    ));
    let error = session.push_target(id).unwrap_err();
    assert_eq!(error.kind(), Some(ErrorKind::InvalidArgument));
    assert!(format!("{error}").contains("reserved bottom stratum"));
}

#[test]
fn test_provider_prefers_the_higher_stratum()
{
    let mut session = new_session();
    let file_id = session.register_target(Box::new(
        FakeTarget::builder("fake-file", Stratum::File)
            .caps(&[TargetOp::Transfer])
            .finish(),
    ));
    let process_id = session.register_target(Box::new(process_builder(0).finish()));

    session.push_target(file_id).unwrap();
    session.push_target(process_id).unwrap();
    assert_eq!(session.provider_for(TargetOp::Transfer), Provider::Target(process_id));

    // With the process gone the operation falls to the layer beneath.
    session.unpush_target(process_id).unwrap();
    assert_eq!(session.provider_for(TargetOp::Transfer), Provider::Target(file_id));
}

#[test]
fn test_displacement_moves_the_resume_provider()
{
    let mut session = new_session();
    let process_a = session.register_target(Box::new(process_builder(0).finish()));
    let core = session.register_target(Box::new(
        FakeTarget::builder("fake-core", Stratum::Core)
            .caps(&[TargetOp::Transfer, TargetOp::FetchRegisters])
            .memory()
            .registers()
            .finish(),
    ));
    let process_c = session.register_target(Box::new(process_builder(7).finish()));

    session.push_target(process_a).unwrap();
    assert!(!session.push_target(core).unwrap());

    // The core dump sits below the live process and supplies no resume.
    assert_eq!(session.provider_for(TargetOp::Resume), Provider::Target(process_a));

    // Replacing the process at its stratum moves the slot to the newcomer.
    session.push_target(process_c).unwrap();
    assert_eq!(session.provider_for(TargetOp::Resume), Provider::Target(process_c));
}

#[test]
fn test_default_behaviors_with_an_empty_stack()
{
    let mut session = new_session();

    let error = session.resume(&ResumeRequest::continue_all()).unwrap_err();
    assert_eq!(error.kind(), Some(ErrorKind::NoProcess));
    assert_eq!(format!("{error}"), "You can't do that without a process to debug.");

    let error = session.attach(ProcessId(7)).unwrap_err();
    assert_eq!(error.kind(), Some(ErrorKind::Unsupported));
    assert_eq!(format!("{error}"), "\"attach\" is not supported by the `none' target");

    // Detaching nothing and probing threads are quietly harmless.
    session.detach().unwrap();
    assert!(!session.thread_alive(ThreadId(1)).unwrap());
    session.update_thread_list().unwrap();
    assert!(session.threads().is_empty());
}

#[test]
fn test_open_target_pushes_after_opening()
{
    let mut session = new_session();
    let target = process_builder(0).finish();
    let counters = target.counters();
    let id = session.register_target(Box::new(target));

    assert!(session.open_target(id, "/tmp/victim 1234").unwrap());
    assert_eq!(counters.borrow().opens, 1);
    assert_eq!(counters.borrow().open_args, vec!["/tmp/victim 1234".to_string()]);
    assert_eq!(session.top_shortname(), "fake-proc");
}

#[test]
fn test_failed_open_leaves_the_stack_alone()
{
    let mut session = new_session();
    let id = session.register_target(Box::new(process_builder(0).fail_open().finish()));

    let error = session.open_target(id, "").unwrap_err();
    assert!(format!("{error}").contains("scripted open failure"));
    assert_eq!(session.target_depth(), 1);
    assert_eq!(session.top_shortname(), "none");
}

#[test]
fn test_attach_reaches_the_providing_target()
{
    let mut session = new_session();
    let target = process_builder(0).finish();
    let counters = target.counters();
    let id = session.register_target(Box::new(target));
    session.push_target(id).unwrap();

    session.attach(ProcessId(4321)).unwrap();
    assert_eq!(counters.borrow().attaches, 1);
}

#[test]
fn test_detach_unlinks_the_detached_target()
{
    let mut session = new_session();
    let target = process_builder(0).finish();
    let counters = target.counters();
    let id = session.register_target(Box::new(target));
    session.push_target(id).unwrap();

    session.detach().unwrap();
    assert_eq!(counters.borrow().detaches, 1);
    assert_eq!(counters.borrow().closes, 1);
    assert_eq!(session.target_depth(), 1);
    assert_eq!(session.top_shortname(), "none");
}

#[test]
fn test_liveness_claims_or_across_active_targets()
{
    let mut session = new_session();
    let file_id = session.register_target(Box::new(
        FakeTarget::builder("fake-file", Stratum::File).memory().finish(),
    ));
    let process_id = session.register_target(Box::new(
        FakeTarget::builder("fake-proc", Stratum::Process)
            .caps(&TargetOp::ALL)
            .execution()
            .registers()
            .finish(),
    ));

    session.push_target(file_id).unwrap();
    session.push_target(process_id).unwrap();
    assert!(session.has_memory());
    assert!(session.has_execution());
    assert!(session.has_registers());
    assert!(!session.has_stack());

    session.unpush_target(process_id).unwrap();
    assert!(session.has_memory());
    assert!(!session.has_execution());
    assert!(!session.has_registers());
}

#[test]
fn test_stack_mutations_invalidate_register_caches()
{
    let mut session = new_session();
    let target = process_builder(0).finish();
    let counters = target.counters();
    let process_id = session.register_target(Box::new(target));
    let file_id = session.register_target(Box::new(
        FakeTarget::builder("fake-file", Stratum::File).finish(),
    ));

    session.push_target(process_id).unwrap();
    session.read_register(ThreadId(1), RegisterId(0)).unwrap();
    assert_eq!(counters.borrow().fetches, 1);

    session.push_target(file_id).unwrap();
    session.read_register(ThreadId(1), RegisterId(0)).unwrap();
    assert_eq!(counters.borrow().fetches, 2);
}

#[test]
fn test_wait_tracks_the_reporting_thread()
{
    let mut session = new_session();
    let id = session.register_target(Box::new(
        process_builder(0)
            .wait_event(2, WaitStatus::Stopped { signal: 5 })
            .finish(),
    ));
    session.push_target(id).unwrap();

    let event = session.wait().unwrap();
    assert_eq!(event.thread, ThreadId(2));
    assert_eq!(event.status, WaitStatus::Stopped { signal: 5 });
    assert_eq!(session.current_thread(), ThreadId(2));
    assert!(session.threads().contains(&ThreadId(2)));
}

#[test]
fn test_update_thread_list_merges_and_prunes()
{
    let mut session = new_session();
    let id = session.register_target(Box::new(
        process_builder(0)
            .discovered(&[1, 2, 3])
            .alive(&[2, 3])
            .finish(),
    ));
    session.push_target(id).unwrap();

    session.update_thread_list().unwrap();
    assert_eq!(session.threads(), &[ThreadId(2), ThreadId(3)]);
}
