//! Participant-facing message texts.

use indoc::formatdoc;

use crate::ledger::{Completion, DayView};
use crate::messenger::{Control, OutgoingMessage};
use crate::model::{ProgressRecord, UserStats};

fn days(n: u32) -> String {
    if n == 1 {
        "1 day".to_string()
    } else {
        format!("{n} days")
    }
}

/// `✅` per answer up to `total`, `⬜` for the rest.
pub fn progress_bar(current: u32, total: u32) -> String {
    let filled = current.min(total) as usize;
    let empty = total as usize - filled;
    format!("{}{}", "✅".repeat(filled), "⬜".repeat(empty))
}

fn change_control(view: &DayView) -> Option<Control> {
    (!view.record.is_finalized() && view.changes_left > 0).then_some(Control::ChangeQuestion {
        remaining: view.changes_left,
    })
}

/// The day's prompt with current progress.
pub fn question_of_day(view: &DayView, threshold: u32) -> OutgoingMessage {
    let record = &view.record;
    let bar = progress_bar(record.answers_count, threshold);
    let status = if record.is_completed {
        "Done for today. A new question arrives tomorrow.".to_string()
    } else if record.answers_count > 0 {
        format!(
            "{}/{threshold} so far. {} to go.",
            record.answers_count,
            threshold.saturating_sub(record.answers_count)
        )
    } else {
        format!("Send {threshold} answers before the day ends, one per line or one per message.")
    };

    let mut message = OutgoingMessage::text(format!(
        "Question of the day: {}\n\n{bar}\n\n{status}",
        view.question.text
    ));
    if let Some(control) = change_control(view) {
        message = message.with_control(control);
    }
    message
}

/// Acknowledgement after answers were recorded but the day is still open.
pub fn progress(record: &ProgressRecord, threshold: u32, changes_left: u32) -> OutgoingMessage {
    let bar = progress_bar(record.answers_count, threshold);
    let mut message = OutgoingMessage::text(format!(
        "{bar}\n\nAnswers: {}/{threshold}. {} to go.",
        record.answers_count,
        threshold.saturating_sub(record.answers_count)
    ));
    if changes_left > 0 {
        message = message.with_control(Control::ChangeQuestion {
            remaining: changes_left,
        });
    }
    message
}

pub fn completed(completion: &Completion, threshold: u32) -> OutgoingMessage {
    let mut text = format!(
        "{}\n\nWell done, today's task is complete!\nStreak: {}. Best: {}.",
        progress_bar(threshold, threshold),
        days(completion.streak.current),
        days(completion.streak.best),
    );
    for badge in &completion.new_badges {
        text.push_str(&format!(
            "\n\nNew badge: {} {} ({})",
            badge.emoji, badge.name, badge.description
        ));
    }
    OutgoingMessage::text(text)
}

/// Nudge for a user whose record is missing or incomplete.
pub fn reminder(
    record: Option<&ProgressRecord>,
    threshold: u32,
    is_final: bool,
) -> OutgoingMessage {
    let answers = record.map_or(0, |r| r.answers_count);
    let header = if is_final { "Last reminder!" } else { "Reminder!" };
    let body = match (answers, is_final) {
        (0, false) => format!(
            "Don't forget today's question. Send {threshold} answers before the day ends."
        ),
        (0, true) => {
            "Less than two hours left. Answer today's question to keep your streak.".to_string()
        }
        (n, false) => format!(
            "You have {n}/{threshold}. {} to go, keep going!",
            threshold.saturating_sub(n)
        ),
        (n, true) => format!(
            "You have {n}/{threshold}, only {} left. Finish before midnight to keep your streak!",
            threshold.saturating_sub(n)
        ),
    };
    OutgoingMessage::text(format!("{header}\n\n{body}"))
}

pub fn weekly_digest(stats: &UserStats) -> OutgoingMessage {
    let mut text = formatdoc! {"
        Your week in review

        Current streak: {current}
        Best streak: {best}
        Completed days: {completed}",
        current = days(stats.current_streak),
        best = days(stats.best_streak),
        completed = stats.completed_days,
    };

    if !stats.badges.is_empty() {
        text.push_str("\n\nBadges:");
        for earned in &stats.badges {
            text.push_str(&format!("\n{} {}", earned.badge.emoji, earned.badge.name));
        }
    }

    let closing = match stats.current_streak {
        0 => "Start a new streak with tomorrow's question.",
        1..=6 => "Good start, keep it going.",
        7..=29 => "Impressive streak. Keep it up!",
        30..=99 => "Incredible consistency.",
        _ => "Legendary streak.",
    };
    text.push_str("\n\n");
    text.push_str(closing);
    OutgoingMessage::text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Question;
    use chrono::NaiveDate;

    fn record(answers: u32, completed: bool, changes: u32) -> ProgressRecord {
        ProgressRecord {
            id: 1,
            user_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            question_id: 1,
            answers_count: answers,
            is_completed: completed,
            question_changes: changes,
            closed_at: None,
        }
    }

    fn view(answers: u32, completed: bool, changes_left: u32) -> DayView {
        DayView {
            record: record(answers, completed, 3 - changes_left),
            question: Question {
                id: 1,
                text: "Uses for a brick?".into(),
            },
            changes_left,
        }
    }

    #[test]
    fn progress_bar_caps_at_total() {
        assert_eq!(progress_bar(3, 5), "✅✅✅⬜⬜");
        assert_eq!(progress_bar(12, 3), "✅✅✅");
    }

    #[test]
    fn question_offers_change_while_open() {
        let msg = question_of_day(&view(0, false, 2), 10);
        assert!(msg.text.contains("Uses for a brick?"));
        assert_eq!(msg.controls, vec![Control::ChangeQuestion { remaining: 2 }]);
    }

    #[test]
    fn no_change_offer_when_done_or_exhausted() {
        assert!(question_of_day(&view(10, true, 2), 10).controls.is_empty());
        assert!(question_of_day(&view(4, false, 0), 10).controls.is_empty());
    }

    #[test]
    fn reminder_mentions_remaining() {
        let r = record(4, false, 0);
        let msg = reminder(Some(&r), 10, false);
        assert!(msg.text.contains("4/10"));
        assert!(msg.text.contains("6 to go"));
        assert!(reminder(None, 10, true).text.starts_with("Last reminder!"));
    }

    #[test]
    fn digest_lists_streaks() {
        let stats = UserStats {
            user_id: 1,
            current_streak: 1,
            best_streak: 8,
            completed_days: 12,
            missed_days: 2,
            last_completed_date: None,
            reachable: true,
            badges: vec![],
            today: None,
        };
        let text = weekly_digest(&stats).text;
        assert!(text.contains("Current streak: 1 day"));
        assert!(text.contains("Best streak: 8 days"));
        assert!(text.contains("Completed days: 12"));
    }
}
