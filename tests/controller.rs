mod common;

use common::*;
use llama_interactive::controller::Interrupt;
use llama_interactive::ui::{ColorMode, Line, ScriptedInput, Transcript};
use llama_interactive::{ByteEngine, Controller, Error, Outcome, Step};

fn controller(params: llama_interactive::Params, engine: ScriptedEngine) -> Controller<ScriptedEngine, Transcript> {
    Controller::new(params, engine, Transcript::new()).unwrap()
}

fn step_until_input(controller: &mut Controller<ScriptedEngine, Transcript>) {
    for _ in 0..100 {
        if controller.step().unwrap() == Step::AwaitingInput {
            return;
        }
    }
    panic!("controller never asked for input");
}

#[test]
fn budget_produces_exactly_n_predict_tokens() {
    let mut params = params("Hello");
    params.n_predict = 80;
    let mut controller = controller(params, ScriptedEngine::new(2048));

    let outcome = controller.run(&mut ScriptedInput::default()).unwrap();

    assert_eq!(outcome, Outcome::BudgetExhausted);
    assert_eq!(controller.timings().n_sampled(), 80);
    assert_eq!(controller.n_remain(), 0);
    assert_eq!(controller.history().len(), 2048);
    assert!(controller.display().text().ends_with(&"x".repeat(80)));
    // Asking again does not generate more.
    assert_eq!(controller.step().unwrap(), Step::Done(Outcome::BudgetExhausted));
    assert_eq!(controller.timings().n_sampled(), 80);
}

#[test]
fn unlimited_budget_is_not_decremented() {
    let mut params = params("Hello");
    params.n_predict = -1;
    let engine = ScriptedEngine::new(2048).with_script([b'a' as u32, b'b' as u32, EOS]);
    let mut controller = controller(params, engine);

    assert_eq!(controller.run(&mut ScriptedInput::default()).unwrap(), Outcome::EndOfText);
    assert_eq!(controller.n_remain(), -1);
    assert_eq!(controller.timings().n_sampled(), 3);
}

#[test]
fn n_keep_clamps_to_prompt_length() {
    let mut params = params("abc");
    params.n_keep = -1;
    let controller = controller(params, ScriptedEngine::new(2048));

    // BOS, leading space and three bytes.
    assert_eq!(controller.input().len(), 5);
    assert_eq!(controller.n_keep(), 5);
}

#[test]
fn prompt_is_prepared_with_bos_and_leading_space() {
    let controller = controller(params("Hi"), ScriptedEngine::new(2048));
    assert_eq!(controller.input().tokens(), &[BOS, b' ' as u32, b'H' as u32, b'i' as u32]);
    assert_eq!(controller.display().modes(), &[ColorMode::Prompt]);
}

#[test]
fn prompt_longer_than_context_is_rejected() {
    let mut params = params("abcdefgh");
    params.n_ctx = 8;
    let result = Controller::new(params, ScriptedEngine::new(8), Transcript::new());

    assert!(matches!(result, Err(Error::PromptTooLong { n_tokens: 10, max: 4 })));
}

#[test]
fn end_of_sequence_terminates() {
    let engine = ScriptedEngine::new(2048).with_script([EOS]);
    let mut controller = controller(params("Hello"), engine);

    assert_eq!(controller.run(&mut ScriptedInput::default()).unwrap(), Outcome::EndOfText);
    assert!(controller.display().text().ends_with(" [end of text]\n"));
    assert_eq!(controller.timings().n_sampled(), 1);
}

#[test]
fn antiprompt_in_history_pauses_for_input() {
    let mut params = params("Do it.\n\n### Instruction:\n\n");
    params.antiprompt = vec!["### Instruction:\n\n".to_string()];
    let mut controller = controller(params, ScriptedEngine::new(2048));
    assert!(controller.is_interactive());

    assert_eq!(controller.step().unwrap(), Step::Continue);
    assert!(controller.is_interacting());
    assert!(controller.is_antiprompt());
    assert!(controller.display().modes().contains(&ColorMode::UserInput));

    // Nothing generated yet, so the pause waits for the prompt to be evaluated.
    assert_eq!(controller.step().unwrap(), Step::AwaitingInput);
    assert_eq!(controller.timings().n_sampled(), 0);
}

#[test]
fn interactive_end_of_sequence_becomes_newline_and_reverse_prompt() {
    let mut params = params("Hello");
    params.antiprompt = vec!["User:".to_string()];
    let engine = ScriptedEngine::new(2048).with_script([EOS]);
    let mut controller = controller(params, engine);

    step_until_input(&mut controller);

    assert!(controller.is_antiprompt());
    assert!(controller.display().text().ends_with("Hello\nUser:"));
    assert!(controller.input().tokens().ends_with(&bytes("User:")));

    assert_eq!(controller.submit_input(Some("hi\n".to_string())).unwrap(), Step::Continue);
    assert!(controller.input_noecho());
    assert!(!controller.is_interacting());
    assert!(controller.input().tokens().ends_with(&bytes("User:hi\n")));
    assert_eq!(controller.n_remain(), 80 - 1 - 3);

    step_until_input(&mut controller);
    assert!(!controller.display().text().contains("hi\n"));
    assert_eq!(controller.submit_input(None).unwrap(), Step::Done(Outcome::InputClosed));
}

#[test]
fn multibyte_antiprompt_is_detected_and_echoed_intact() {
    let mut params = params("ok →");
    params.antiprompt = vec!["→".to_string()];
    let mut controller = Controller::new(params, ByteEngine::new(64), Transcript::new()).unwrap();

    assert_eq!(controller.step().unwrap(), Step::Continue);

    assert!(controller.is_antiprompt());
    assert!(controller.is_interacting());
    let text = controller.display().text();
    assert!(text.ends_with(" ok →"), "{text:?}");
    assert!(!text.contains(char::REPLACEMENT_CHARACTER));
}

#[test]
fn interactive_budget_resets_instead_of_ending() {
    let mut params = params("Hello");
    params.interactive = true;
    params.n_predict = 5;
    let mut controller = controller(params, ScriptedEngine::new(2048));

    step_until_input(&mut controller);

    assert_eq!(controller.timings().n_sampled(), 5);
    assert_eq!(controller.n_remain(), 5);
    assert!(controller.is_interacting());
    assert!(!controller.is_antiprompt());
}

#[test]
fn instruct_mode_frames_user_turns() {
    let mut params = params("");
    params.instruct = true;
    let engine = ScriptedEngine::new(2048).with_script([b'?' as u32, b'O' as u32, b'k' as u32, EOS]);
    let mut controller = controller(params, engine);
    let mut input = ScriptedInput::from_text(["Say hi"]);

    assert!(controller.params().interactive_first);
    assert_eq!(controller.params().antiprompt, vec!["### Instruction:\n\n".to_string()]);

    let outcome = controller.run(&mut input).unwrap();
    assert_eq!(outcome, Outcome::InputClosed);

    let mut expected = vec![BOS, b' ' as u32, BOS];
    expected.extend(bytes("\n\n### Instruction:\n\n"));
    expected.extend(bytes("Say hi\n"));
    expected.extend(bytes("\n\n### Response:\n\n"));
    assert_eq!(controller.input().tokens(), &expected[..]);

    assert!(controller.display().text().ends_with("Ok"));
    assert_eq!(input.prompts(), &["\n> ", "\n> "]);
}

#[test]
fn continuation_lines_are_joined() {
    let mut params = params("Hello");
    params.interactive_first = true;
    let mut controller = controller(params, ScriptedEngine::new(2048).with_script([b'?' as u32, EOS]));
    let mut input = ScriptedInput::new([
        Line::Text("one\\".to_string()),
        Line::Text("two".to_string()),
        Line::Eof,
    ]);

    assert_eq!(controller.run(&mut input).unwrap(), Outcome::InputClosed);
    assert!(controller.input().tokens().ends_with(&bytes("one\ntwo\n")));
}

#[test]
fn input_prefix_is_prepended() {
    let mut params = params("Hello");
    params.interactive_first = true;
    params.input_prefix = "Q: ".to_string();
    let mut controller = controller(params, ScriptedEngine::new(2048));
    let mut input = ScriptedInput::from_text(["why"]);

    controller.run(&mut input).unwrap();

    assert!(controller.input().tokens().ends_with(&bytes("Q: why\n")));
    assert_eq!(input.prompts()[0], "Q: ");
}

#[test]
fn context_swap_keeps_generation_inside_window() {
    let mut params = params("ab");
    params.n_ctx = 16;
    params.n_keep = -1;
    params.n_predict = 40;
    let mut controller = controller(params, ScriptedEngine::new(16));
    assert_eq!(controller.n_keep(), 4);

    let outcome = controller.run(&mut ScriptedInput::default()).unwrap();

    assert_eq!(outcome, Outcome::BudgetExhausted);
    let evals = &controller.engine().evals;
    assert!(evals.iter().all(|(tokens, n_past)| n_past + tokens.len() <= 16));
    // First swap: 12 tokens past the kept prefix, half of them replayed.
    assert!(evals.contains(&(vec![b'x' as u32; 7], 4)));
}

#[test]
fn user_turn_after_full_context_still_fits() {
    let mut params = params("abcdefghi");
    params.n_ctx = 16;
    params.n_keep = -1;
    params.n_predict = -1;
    params.antiprompt = vec!["?".to_string()];
    let engine = ScriptedEngine::new(16).with_script(bytes("xxxx?"));
    let mut controller = controller(params, engine);
    assert_eq!(controller.n_keep(), 11);

    step_until_input(&mut controller);
    controller.submit_input(Some("hello\n".to_string())).unwrap();
    for _ in 0..3 {
        controller.step().unwrap();
    }

    let evals = &controller.engine().evals;
    assert!(evals.iter().all(|(tokens, n_past)| n_past + tokens.len() <= 16));
    // No room left for replay, so part of the kept prompt makes way.
    assert!(evals.contains(&(bytes("hello\n"), 10)));
}

#[test]
fn forced_interrupt_halts_immediately() {
    let mut controller = controller(params("Hello"), ScriptedEngine::new(2048));
    controller.interrupt().force();

    assert_eq!(controller.step().unwrap(), Step::Done(Outcome::Interrupted));
    assert!(controller.engine().evals.is_empty());
}

#[test]
fn forced_interrupt_between_batches_skips_the_rest() {
    let mut params = params("ab");
    params.n_ctx = 16;
    params.n_keep = -1;
    params.n_batch = 2;
    let engine = ScriptedEngine::new(16);
    let force = engine.force_after_evals.clone();
    let mut controller = controller(params, engine);
    // Prompt in two batches, then twelve single tokens fill the context. The
    // swap that follows replays seven tokens in four batches.
    *force.borrow_mut() = Some((15, controller.interrupt()));

    let outcome = controller.run(&mut ScriptedInput::default()).unwrap();

    assert_eq!(outcome, Outcome::Interrupted);
    let evals = &controller.engine().evals;
    assert_eq!(evals.len(), 15);
    assert_eq!(evals[14], (vec![b'x' as u32; 2], 4));
    assert_eq!(controller.n_past(), 6);
}

#[test]
fn first_interrupt_stops_non_interactive_run() {
    let mut controller = controller(params("Hello"), ScriptedEngine::new(2048));
    controller.step().unwrap();
    controller.interrupt().signal();

    assert_eq!(controller.step().unwrap(), Step::Done(Outcome::Interrupted));

    controller.begin_run("");
    assert_eq!(controller.step().unwrap(), Step::Continue);
    assert!(!controller.interrupt().is_armed());
}

#[test]
fn interrupts_arm_then_force_in_interactive_mode() {
    let mut params = params("Hello");
    params.interactive = true;
    let mut controller = controller(params, ScriptedEngine::new(2048));
    let interrupt: Interrupt = controller.interrupt();

    controller.step().unwrap();
    controller.step().unwrap();
    assert_eq!(controller.timings().n_sampled(), 1);

    interrupt.signal();
    assert_eq!(controller.step().unwrap(), Step::AwaitingInput);
    assert_eq!(controller.timings().n_sampled(), 1);

    interrupt.signal();
    assert_eq!(controller.step().unwrap(), Step::Done(Outcome::Interrupted));
}

#[test]
fn eval_failure_is_fatal() {
    let mut engine = ScriptedEngine::new(2048);
    engine.fail_eval = true;
    let mut controller = controller(params("Hello"), engine);

    assert_eq!(controller.step().unwrap(), Step::Continue);
    assert!(matches!(controller.step(), Err(Error::Eval(_))));
}

#[test]
fn submit_without_pause_is_rejected() {
    let mut controller = controller(params("Hello"), ScriptedEngine::new(2048));
    assert!(matches!(
        controller.submit_input(Some("hi".to_string())),
        Err(Error::NotAwaitingInput)
    ));
}

#[test]
fn begin_run_resets_budget_after_user_text() {
    let mut params = params("Hello");
    params.n_predict = 10;
    let mut controller = controller(params, ScriptedEngine::new(2048));
    assert_eq!(controller.run(&mut ScriptedInput::default()).unwrap(), Outcome::BudgetExhausted);

    controller.begin_run("go\n");
    assert_eq!(controller.n_remain(), 7);
    assert_eq!(controller.run(&mut ScriptedInput::default()).unwrap(), Outcome::BudgetExhausted);
    assert_eq!(controller.timings().n_sampled(), 17);
}

#[test]
fn live_edits_apply_to_next_run() {
    let mut params = params("Hello");
    params.n_predict = 2;
    let mut controller = controller(params, ScriptedEngine::new(2048));
    controller.run(&mut ScriptedInput::default()).unwrap();

    controller.set_n_predict(4);
    controller.set_temperature(0.5);
    controller.begin_run("");

    assert_eq!(controller.params().n_predict, 4);
    assert_eq!(controller.params().sampling.temp, 0.5);
    assert_eq!(controller.n_remain(), 4);
}

#[test]
fn replace_prompt_restarts_conversation() {
    let mut params = params("Hello");
    params.n_predict = 3;
    params.n_ctx = 16;
    let mut controller = controller(params, ScriptedEngine::new(16));
    controller.run(&mut ScriptedInput::default()).unwrap();
    assert!(controller.n_past() > 0);

    assert!(matches!(
        controller.replace_prompt("much too long for this context"),
        Err(Error::PromptTooLong { .. })
    ));
    assert!(controller.n_past() > 0);

    controller.replace_prompt("new").unwrap();
    assert_eq!(controller.n_past(), 0);
    assert_eq!(controller.input().tokens(), &[BOS, b' ' as u32, b'n' as u32, b'e' as u32, b'w' as u32]);
    assert!(controller.session().is_empty());

    assert_eq!(controller.run(&mut ScriptedInput::default()).unwrap(), Outcome::BudgetExhausted);
    let (first_eval, n_past) = &controller.engine().evals[controller.engine().evals.len() - 3];
    assert_eq!(*n_past, 0);
    assert_eq!(first_eval.len(), 5);
}
