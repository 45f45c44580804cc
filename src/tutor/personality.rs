//! 性格化文案：欢迎语、回复后缀、告别语
//!
//! 全部为纯函数；翻译在外层统一处理。

use crate::session::TutorPersonality;

/// 回复末尾追加的性格后缀（六种固定模板）
pub fn personality_suffix(personality: TutorPersonality) -> &'static str {
    match personality {
        TutorPersonality::Encouraging => "You're doing great, keep it up!",
        TutorPersonality::Analytical => {
            "Try breaking the problem into smaller parts and examine each one logically."
        }
        TutorPersonality::Patient => {
            "Take your time. We can go over this again as many times as you need."
        }
        TutorPersonality::Challenging => {
            "Ready for a challenge? Try applying this to a harder problem on your own."
        }
        TutorPersonality::Creative => {
            "Try picturing this as a story or a drawing to make it stick."
        }
        TutorPersonality::Adaptable => {
            "Let me know if you'd like me to explain this in a different way."
        }
    }
}

/// 在正文后拼接性格后缀
pub fn with_personality(text: &str, personality: TutorPersonality) -> String {
    format!("{}\n\n{}", text.trim_end(), personality_suffix(personality))
}

/// 欢迎语：科目 + 性格 + 是否带课程/测验上下文（语言由调用方翻译）
pub fn welcome_message(
    subject: &str,
    personality: TutorPersonality,
    has_lesson: bool,
    has_quiz: bool,
) -> String {
    let greeting = match personality {
        TutorPersonality::Encouraging => format!(
            "Hi there! I'm so excited to help you learn {subject} today. You've got this!"
        ),
        TutorPersonality::Analytical => format!(
            "Hello. Let's approach {subject} systematically and build a solid understanding step by step."
        ),
        TutorPersonality::Patient => format!(
            "Welcome! We'll go through {subject} at whatever pace feels right for you. There's no rush."
        ),
        TutorPersonality::Challenging => format!(
            "Ready to push yourself? Let's dig into {subject} and see how far we can go."
        ),
        TutorPersonality::Creative => format!(
            "Hi! Let's explore {subject} in fresh and imaginative ways today."
        ),
        TutorPersonality::Adaptable => format!(
            "Hello! I'll adjust to how you learn best. What would you like to work on in {subject}?"
        ),
    };

    let context = if has_lesson && has_quiz {
        Some("I see you're working on a lesson and its quiz. Let's make sure you're ready for both.")
    } else if has_lesson {
        Some("I see you're working on a lesson. Ask me anything about it.")
    } else if has_quiz {
        Some("I see you're preparing for a quiz. I'll help you understand the concepts without giving away the answers.")
    } else {
        None
    };

    match context {
        Some(ctx) => format!("{greeting} {ctx}"),
        None => greeting,
    }
}

/// 告别语：包含时长与消息数统计
pub fn farewell_message(
    subject: &str,
    personality: TutorPersonality,
    elapsed_minutes: i64,
    message_count: usize,
) -> String {
    let closing = match personality {
        TutorPersonality::Encouraging => "I'm proud of the effort you put in today!",
        TutorPersonality::Analytical => "Review your notes once more to consolidate what we covered.",
        TutorPersonality::Patient => "Come back whenever you're ready to continue.",
        TutorPersonality::Challenging => "Next time, we'll tackle something even harder.",
        TutorPersonality::Creative => "Keep finding new ways to look at what you learned.",
        TutorPersonality::Adaptable => "Next time we can pick up wherever suits you best.",
    };
    let minutes = if elapsed_minutes == 1 { "minute" } else { "minutes" };
    let messages = if message_count == 1 { "message" } else { "messages" };
    format!(
        "Great session! We spent {elapsed_minutes} {minutes} on {subject} and exchanged {message_count} {messages}. {closing}"
    )
}
