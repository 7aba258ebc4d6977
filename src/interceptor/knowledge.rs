/// A question keyword and the short answer shipped with the offline bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeSnippet {
    pub question: &'static str,
    pub answer: &'static str,
}

/// Snippets bundled with the offline layer. Reference data only: the
/// interceptor never consults them, the offline answer is always the fixed
/// fallback record.
pub const OFFLINE_KNOWLEDGE: [KnowledgeSnippet; 3] = [
    KnowledgeSnippet {
        question: "PM-KISAN",
        answer: "PM-KISAN gives ₹6,000/year in 3 installments to all small/marginal farmers. Apply at pmkisan.gov.in or CSC center with Aadhaar + bank passbook + land records.",
    },
    KnowledgeSnippet {
        question: "crop insurance",
        answer: "PMFBY crop insurance: Kharif 2%, Rabi 1.5% premium. Apply within 2 weeks of sowing at your bank or pmfby.gov.in. Claim within 72 hours of damage.",
    },
    KnowledgeSnippet {
        question: "kisan credit card",
        answer: "KCC: Credit at 7% p.a. (4% effective). Apply at any bank. PM-KISAN farmers get it without income proof. Covers seeds, fertilizers, equipment.",
    },
];
