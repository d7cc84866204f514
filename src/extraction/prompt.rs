//! Prompt used to pull core symptoms out of nursing notes.

/// System message establishing the assistant role.
pub const SYSTEM_PROMPT: &str = "You are a health care expert. \
Follow the instructions below to extract the symptoms from the patient medical notes.";

const TEMPLATE: &str = r#"You are given medical notes taken by a nurse from a patient. Here is what to do:
<patient_medical_notes>
{patient_medical_notes}
</patient_medical_notes>
1. **Analyze the medical notes** to extract the symptoms:
   - Identify any misspellings or typos in the notes and correct them
   - Identify the symptoms mentioned by the patient
   - Identify the core symptom. It carries no severity and should be the root word.
     Example:
        Wrong core symptoms: High acute cough, feverish
        Correct core symptoms: cough, fever
2. **Identify the severity**
    - Give each symptom a severity between 1 and 3, 1 being mild and 3 being extreme
3. **Prioritize the symptoms**
    - Give each symptom a priority between 1 and 3, 1 being high priority and 3 being low priority
4. **Provide the output in strict JSON format**:
   {
        "symptoms" : [
            { "core_symptom": "fever", "severity": "2", "priority": "2" },
            { "core_symptom": "cough", "severity": "3", "priority": "3" }
        ]
   }

Example:
Input: Patient having high fever for past 3 days, experiencing mild cough for past 2 days along with severe head ache for past 4 days
Output: {
        "symptoms" : [
            { "core_symptom": "fever", "severity": "2", "priority": "1" },
            { "core_symptom": "cough", "severity": "1", "priority": "3" },
            { "core_symptom": "headache", "severity": "3", "priority": "2" }
        ]
   }
"#;

/// Render the user message for the given notes.
pub fn render_user_prompt(notes: &str) -> String {
    TEMPLATE.replace("{patient_medical_notes}", notes.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_embedded_between_tags() {
        let prompt = render_user_prompt("  fever since monday ");
        assert!(prompt.contains(
            "<patient_medical_notes>\nfever since monday\n</patient_medical_notes>"
        ));
        assert!(!prompt.contains("{patient_medical_notes}"));
    }
}
