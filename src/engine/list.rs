//! Running lists of cases.
//!
//! A case marked with [`TestCase::exclude_others`](super::TestCase::exclude_others) focuses the list: the first such
//! case runs alone, on the calling thread, and every other case is skipped. Otherwise every case not marked with
//! [`TestCase::exclude`](super::TestCase::exclude) runs, in list order or concurrently.

use crate::error::{CaseResult, render_diagnostic};
use crate::host::Scope;

use super::case::Case;

/// Run `cases` one after another in sub-scopes of `scope`.
pub fn run_list<C: Case>(scope: &Scope, cases: &[C]) {
    run_cases(scope, cases, false);
}

/// Run `cases` in parallel sub-scopes of `scope`.
///
/// The cases are joined when `scope` completes.
pub fn run_list_parallel<C: Case>(scope: &Scope, cases: &[C]) {
    run_cases(scope, cases, true);
}

#[tracing::instrument(skip_all, fields(scope = %scope.name(), cases = cases.len(), parallel = parallel))]
fn run_cases<C: Case>(scope: &Scope, cases: &[C], parallel: bool) {
    if let Some(focused) = cases.iter().find(|case| case.excludes_others()) {
        tracing::debug!(case = %focused.name(), "running focused case only");
        report(scope, focused.name(), focused.execute(scope, false));
        return;
    }

    for case in cases {
        if case.is_excluded() {
            tracing::debug!(case = %case.name(), "skipping excluded case");
            continue;
        }
        report(scope, case.name(), case.execute(scope, parallel));
    }
}

fn report(scope: &Scope, case: &str, result: CaseResult<()>) {
    if let Err(e) = result {
        tracing::error!(scope = %scope.name(), case, "case could not run: {}", e);
        scope.error(render_diagnostic(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, ReportFormat};
    use crate::engine::{TestCase, Workspace};
    use crate::host::Harness;
    use std::sync::{Arc, Mutex};

    type Trail = Arc<Mutex<Vec<&'static str>>>;

    fn quiet() -> Harness {
        Harness::new(HarnessConfig::new().with_format(ReportFormat::Quiet))
    }

    fn case(trail: &Trail, label: &'static str) -> TestCase<()> {
        let trail = Arc::clone(trail);
        TestCase::new()
            .named(label)
            .add_task(0, move |_: &Scope, _: &mut Workspace<()>| trail.lock().unwrap().push(label))
    }

    #[test]
    fn test_excluded_cases_are_skipped() {
        let trail = Trail::default();
        let cases = vec![case(&trail, "a"), case(&trail, "b").exclude(), case(&trail, "c")];
        quiet().run("root", |t| run_list(t, &cases)).assert_passed();
        assert_eq!(*trail.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_first_focused_case_runs_alone() {
        let trail = Trail::default();
        let cases = vec![
            case(&trail, "a"),
            case(&trail, "b").exclude_others(),
            case(&trail, "c").exclude_others(),
        ];
        let report = quiet().run("root", |t| run_list_parallel(t, &cases));
        report.assert_passed();
        assert_eq!(report.summary().total, 1);
        assert_eq!(*trail.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_focused_case_runs_inline_under_parallel_list() {
        let modes: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
        let mode_case = |label: &'static str| {
            let modes = Arc::clone(&modes);
            TestCase::<()>::new()
                .named(label)
                .add_task(0, move |t: &Scope, _: &mut Workspace<()>| {
                    modes.lock().unwrap().push((t.name().to_string(), t.is_parallel()));
                })
        };

        let plain = vec![mode_case("a"), mode_case("b")];
        quiet().run("plain", |t| run_list_parallel(t, &plain)).assert_passed();
        let focused = vec![mode_case("a"), mode_case("b").exclude_others()];
        quiet().run("focused", |t| run_list_parallel(t, &focused)).assert_passed();

        let mut modes = modes.lock().unwrap().clone();
        modes.sort();
        assert_eq!(
            modes,
            vec![
                ("focused/b".to_string(), false),
                ("plain/a".to_string(), true),
                ("plain/b".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_unrunnable_case_fails_parent_and_others_still_run() {
        let trail = Trail::default();
        let cases = vec![
            TestCase::<()>::new().named("empty"),
            case(&trail, "after"),
        ];
        let report = quiet().run("root", |t| run_list(t, &cases));
        assert!(!report.is_success());
        assert_eq!(*trail.lock().unwrap(), vec!["after"]);
        let root = report.failures().iter().find(|f| f.name == "root").unwrap();
        assert!(root.messages[0].starts_with("[casekit::no_tasks] no task; case=empty"));
    }

    #[test]
    fn test_boxed_cases_of_different_workspaces() {
        let trail = Trail::default();
        let sink = Arc::clone(&trail);
        let cases: Vec<Box<dyn Case>> = vec![
            Box::new(case(&trail, "unit")),
            Box::new(
                TestCase::<String>::new()
                    .named("string")
                    .add_task(0, move |_: &Scope, w: &mut Workspace<String>| {
                        w.push_str("string");
                        sink.lock().unwrap().push("string");
                    }),
            ),
        ];
        quiet().run("root", |t| run_list(t, &cases)).assert_passed();
        assert_eq!(*trail.lock().unwrap(), vec!["unit", "string"]);
    }
}
