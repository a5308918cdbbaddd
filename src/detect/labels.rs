/// COCO class vocabulary in model output order (YOLOv8 and friends).
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Label for a class id, if it is in the vocabulary.
pub fn coco_label(class_id: usize) -> Option<&'static str> {
    COCO_CLASSES.get(class_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_covers_watched_classes() {
        assert_eq!(coco_label(0), Some("person"));
        assert_eq!(coco_label(24), Some("backpack"));
        assert_eq!(coco_label(26), Some("handbag"));
        assert_eq!(coco_label(28), Some("suitcase"));
        assert_eq!(coco_label(80), None);
    }
}
