use crate::legislative::BillResource;

/// Number of questions every article must answer.
pub const QUESTION_COUNT: u8 = 7;

/// One of the fixed questions asked about every bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    /// 1-based, also the order sections appear in the article.
    pub index: u8,
    pub text: &'static str,
    /// Section heading used in the assembled article.
    pub heading: &'static str,
    /// API resources fetched to ground the answer, besides the bill record itself.
    pub resources: &'static [BillResource],
}

pub const QUESTIONS: [Question; QUESTION_COUNT as usize] = [
    Question {
        index: 1,
        text: "What does this bill do? Where is it in the process?",
        heading: "What the bill does",
        resources: &[BillResource::Summaries, BillResource::Actions],
    },
    Question {
        index: 2,
        text: "What committees is this bill in?",
        heading: "Committees",
        resources: &[BillResource::Committees],
    },
    Question {
        index: 3,
        text: "Who is the sponsor?",
        heading: "Sponsor",
        resources: &[],
    },
    Question {
        index: 4,
        text: "Who cosponsored this bill? Are any of the cosponsors on the committee that the bill is in?",
        heading: "Cosponsors",
        resources: &[BillResource::Cosponsors, BillResource::Committees],
    },
    Question {
        index: 5,
        text: "Have any hearings happened on the bill? If so, what were the findings?",
        heading: "Hearings",
        resources: &[BillResource::Committees, BillResource::Actions],
    },
    Question {
        index: 6,
        text: "Have any amendments been proposed on the bill? If so, who proposed them and what do they do?",
        heading: "Amendments",
        resources: &[BillResource::Amendments],
    },
    Question {
        index: 7,
        text: "Have any votes happened on the bill? If so, was it a party-line vote or a bipartisan one?",
        heading: "Votes",
        resources: &[BillResource::Actions],
    },
];

/// Look up a question by its 1-based index.
pub fn question(index: u8) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.index == index)
}
